/// MJPEG 推流 (multipart/x-mixed-replace)
use std::convert::Infallible;

use bytes::{BufMut, Bytes, BytesMut};
use tokio_stream::wrappers::WatchStream;
use tokio_stream::{Stream, StreamExt};

use crate::pipeline::FrameReceiver;

pub const BOUNDARY: &str = "frame";

pub fn content_type() -> String {
    format!("multipart/x-mixed-replace; boundary={}", BOUNDARY)
}

/// --frame\r\nContent-Type: image/jpeg\r\n\r\n<jpeg>\r\n
pub fn frame_part(jpeg: &[u8]) -> Bytes {
    const HEAD: &[u8] = b"--frame\r\nContent-Type: image/jpeg\r\n\r\n";
    let mut part = BytesMut::with_capacity(HEAD.len() + jpeg.len() + 2);
    part.put_slice(HEAD);
    part.put_slice(jpeg);
    part.put_slice(b"\r\n");
    part.freeze()
}

/// 当前帧立即发送, 之后每次更新发送一帧; 来不及发送的中间帧被跳过
pub fn multipart_stream(frames: FrameReceiver) -> impl Stream<Item = Result<Bytes, Infallible>> {
    WatchStream::new(frames).filter_map(|frame| frame.map(|jpeg| Ok(frame_part(&jpeg))))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::watch;

    #[test]
    fn test_frame_part_layout() {
        let part = frame_part(&[0xFF, 0xD8, 0xFF, 0xD9]);
        let mut expected = b"--frame\r\nContent-Type: image/jpeg\r\n\r\n".to_vec();
        expected.extend_from_slice(&[0xFF, 0xD8, 0xFF, 0xD9]);
        expected.extend_from_slice(b"\r\n");
        assert_eq!(&part[..], &expected[..]);
    }

    #[tokio::test]
    async fn test_stream_skips_empty_and_follows_updates() {
        let (tx, rx) = watch::channel(None);
        let mut stream = Box::pin(multipart_stream(rx));

        tx.send_replace(Some(Bytes::from_static(b"one")));
        let first = stream.next().await.unwrap().unwrap();
        assert!(first.ends_with(b"one\r\n"));

        tx.send_replace(Some(Bytes::from_static(b"two")));
        let second = stream.next().await.unwrap().unwrap();
        assert!(second.ends_with(b"two\r\n"));

        drop(tx);
        assert!(stream.next().await.is_none());
    }
}
