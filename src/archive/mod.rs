/// 事故片段归档 (Clip archive)
///
/// 处理线程捕获到事故片段后通过队列交给归档任务:
/// 1. 编码为本地 mp4 (accident_videos/accident_%Y%m%d_%H%M%S.mp4)
/// 2. 复制到 GridFS
/// 3. 写入 accidents 集合
///
/// 归档失败只记录日志, 不影响内存中的事故状态
pub mod encoder;
pub mod record;
pub mod store;

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Local, Utc};
use image::RgbImage;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info};

pub use encoder::{ClipEncoder, FfmpegClipEncoder};
pub use record::{clip_filename, ClipRecord};
pub use store::{ClipStore, MongoClipStore};

use crate::error::{Error, Result};
use crate::incident::GeoPoint;

/// 一次事故的片段
#[derive(Debug, Clone)]
pub struct ClipJob {
    pub frames: Vec<RgbImage>,
    pub location: Option<GeoPoint>,
    pub captured_at: DateTime<Local>,
}

pub struct ClipArchiver {
    dir: PathBuf,
    fps: u32,
    encoder: Arc<dyn ClipEncoder>,
    store: Arc<dyn ClipStore>,
}

impl ClipArchiver {
    pub fn new(
        dir: impl Into<PathBuf>,
        fps: u32,
        encoder: Arc<dyn ClipEncoder>,
        store: Arc<dyn ClipStore>,
    ) -> Self {
        Self {
            dir: dir.into(),
            fps,
            encoder,
            store,
        }
    }

    pub async fn archive(&self, job: ClipJob) -> Result<ClipRecord> {
        tokio::fs::create_dir_all(&self.dir).await?;

        let filename = clip_filename(job.captured_at);
        let path = self.dir.join(&filename);
        let frame_count = job.frames.len();

        let encoder = Arc::clone(&self.encoder);
        let (fps, target) = (self.fps, path.clone());
        tokio::task::spawn_blocking(move || encoder.encode(&job.frames, fps, &target))
            .await
            .map_err(|e| Error::Encode(format!("encoder task: {}", e)))??;

        let bytes = tokio::fs::read(&path).await?;
        let video_id = self.store.put_video(&filename, &bytes).await?;

        let record = ClipRecord::new(
            Utc::now(),
            job.location,
            path.display().to_string(),
            video_id,
        );
        self.store.insert_record(&record).await?;

        info!(
            "💾 事故片段已保存: {} ({}帧) | GridFS id: {}",
            record.local_video_path, frame_count, record.gridfs_video_id
        );
        Ok(record)
    }

    /// 启动归档任务, 队列关闭后退出
    pub fn spawn(self, mut rx: mpsc::Receiver<ClipJob>) -> JoinHandle<()> {
        tokio::spawn(async move {
            while let Some(job) = rx.recv().await {
                if let Err(e) = self.archive(job).await {
                    error!("❌ 事故片段保存失败: {}", e);
                }
            }
            info!("归档任务退出");
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use mongodb::bson::Bson;
    use parking_lot::Mutex;
    use std::path::Path;

    /// 把帧数写进文件, 代替真实编码
    struct CountingEncoder;

    impl ClipEncoder for CountingEncoder {
        fn encode(&self, frames: &[RgbImage], fps: u32, path: &Path) -> Result<()> {
            std::fs::write(path, format!("{}@{}", frames.len(), fps))?;
            Ok(())
        }
    }

    #[derive(Default)]
    struct MemoryStore {
        videos: Mutex<Vec<(String, Vec<u8>)>>,
        records: Mutex<Vec<ClipRecord>>,
    }

    #[async_trait]
    impl ClipStore for MemoryStore {
        async fn put_video(&self, filename: &str, bytes: &[u8]) -> Result<Bson> {
            let mut videos = self.videos.lock();
            videos.push((filename.to_string(), bytes.to_vec()));
            Ok(Bson::Int64(videos.len() as i64))
        }

        async fn insert_record(&self, record: &ClipRecord) -> Result<()> {
            self.records.lock().push(record.clone());
            Ok(())
        }
    }

    fn job(frames: usize) -> ClipJob {
        ClipJob {
            frames: vec![RgbImage::new(4, 4); frames],
            location: Some(GeoPoint::new(24.7136, 46.6753)),
            captured_at: Local::now(),
        }
    }

    #[tokio::test]
    async fn test_archive_writes_file_blob_and_record() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("accident_videos");
        let store = Arc::new(MemoryStore::default());
        let archiver = ClipArchiver::new(&dir, 20, Arc::new(CountingEncoder), store.clone());

        let record = archiver.archive(job(100)).await.unwrap();

        assert!(dir.is_dir());
        let path = PathBuf::from(&record.local_video_path);
        assert!(path.starts_with(&dir));
        let name = path.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("accident_") && name.ends_with(".mp4"));

        let videos = store.videos.lock();
        assert_eq!(videos.len(), 1);
        assert_eq!(videos[0].0, name);
        assert_eq!(videos[0].1, b"100@20");

        let records = store.records.lock();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].gridfs_video_id, Bson::Int64(1));
        assert_eq!(records[0].location, Some(GeoPoint::new(24.7136, 46.6753)));
    }

    #[tokio::test]
    async fn test_spawned_archiver_drains_queue() {
        let tmp = tempfile::tempdir().unwrap();
        let store = Arc::new(MemoryStore::default());
        let archiver = ClipArchiver::new(tmp.path(), 20, Arc::new(CountingEncoder), store.clone());

        let (tx, rx) = mpsc::channel(4);
        let handle = archiver.spawn(rx);
        tx.send(job(3)).await.unwrap();
        drop(tx);
        handle.await.unwrap();

        assert_eq!(store.records.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_encoder_failure_stores_nothing() {
        struct Failing;
        impl ClipEncoder for Failing {
            fn encode(&self, _: &[RgbImage], _: u32, _: &Path) -> Result<()> {
                Err(Error::Encode("boom".to_string()))
            }
        }

        let tmp = tempfile::tempdir().unwrap();
        let store = Arc::new(MemoryStore::default());
        let archiver = ClipArchiver::new(tmp.path(), 20, Arc::new(Failing), store.clone());

        assert!(archiver.archive(job(2)).await.is_err());
        assert!(store.videos.lock().is_empty());
        assert!(store.records.lock().is_empty());
    }
}
