/// 事故片段记录
/// Persisted metadata for one stored accident clip
use chrono::{DateTime, Local, Utc};
use mongodb::bson::{self, Bson};
use serde::{Deserialize, Serialize};

use crate::incident::GeoPoint;

/// `accidents` 集合中的一条记录, 写入后不再修改
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClipRecord {
    pub timestamp: bson::DateTime,
    pub location: Option<GeoPoint>,
    pub local_video_path: String,
    pub gridfs_video_id: Bson,
}

impl ClipRecord {
    pub fn new(
        at: DateTime<Utc>,
        location: Option<GeoPoint>,
        local_video_path: String,
        gridfs_video_id: Bson,
    ) -> Self {
        Self {
            timestamp: bson::DateTime::from_millis(at.timestamp_millis()),
            location,
            local_video_path,
            gridfs_video_id,
        }
    }
}

/// 片段文件名: accident_%Y%m%d_%H%M%S.mp4
pub fn clip_filename(at: DateTime<Local>) -> String {
    format!("accident_{}.mp4", at.format("%Y%m%d_%H%M%S"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_clip_filename() {
        let at = Local.with_ymd_and_hms(2024, 3, 9, 7, 5, 1).unwrap();
        assert_eq!(clip_filename(at), "accident_20240309_070501.mp4");
    }

    #[test]
    fn test_record_serializes_location() {
        let at = Utc.with_ymd_and_hms(2024, 3, 9, 7, 5, 1).unwrap();
        let record = ClipRecord::new(
            at,
            Some(GeoPoint::new(24.7136, 46.6753)),
            "accident_videos/accident_20240309_070501.mp4".to_string(),
            Bson::String("blob-1".to_string()),
        );
        let doc = bson::to_document(&record).unwrap();
        let location = doc.get_document("location").unwrap();
        assert_eq!(location.get_f64("lat").unwrap(), 24.7136);
        assert_eq!(location.get_f64("lng").unwrap(), 46.6753);
        assert_eq!(
            doc.get_datetime("timestamp").unwrap().timestamp_millis(),
            at.timestamp_millis()
        );
        assert_eq!(
            doc.get_str("local_video_path").unwrap(),
            "accident_videos/accident_20240309_070501.mp4"
        );
    }
}
