/// 事故片段存储 (MongoDB + GridFS)
/// Document store for clip records plus a blob store for the encoded video
use async_trait::async_trait;
use futures_util::io::AsyncWriteExt;
use mongodb::bson::{doc, Bson};
use mongodb::gridfs::GridFsBucket;
use mongodb::options::ClientOptions;
use mongodb::{Client, Collection, Database};
use tracing::info;

use super::record::ClipRecord;
use crate::error::Result;

pub const ACCIDENTS_COLLECTION: &str = "accidents";

#[async_trait]
pub trait ClipStore: Send + Sync {
    /// 保存视频字节, 返回 blob 引用
    async fn put_video(&self, filename: &str, bytes: &[u8]) -> Result<Bson>;

    /// 写入一条片段记录
    async fn insert_record(&self, record: &ClipRecord) -> Result<()>;
}

pub struct MongoClipStore {
    db: Database,
    accidents: Collection<ClipRecord>,
    bucket: GridFsBucket,
}

impl MongoClipStore {
    /// 连接并 ping 一次; 连接串错误或服务不可达时返回错误
    pub async fn connect(uri: &str, database: &str) -> Result<Self> {
        let mut options = ClientOptions::parse(uri).await?;
        options.app_name = Some("nabeeh".to_string());
        let client = Client::with_options(options)?;
        let db = client.database(database);
        db.run_command(doc! { "ping": 1 }, None).await?;
        info!("✅ MongoDB 连接成功: {}", database);
        Ok(Self::with_database(db))
    }

    pub fn with_database(db: Database) -> Self {
        Self {
            accidents: db.collection::<ClipRecord>(ACCIDENTS_COLLECTION),
            bucket: db.gridfs_bucket(None),
            db,
        }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }
}

#[async_trait]
impl ClipStore for MongoClipStore {
    async fn put_video(&self, filename: &str, bytes: &[u8]) -> Result<Bson> {
        let mut upload = self.bucket.open_upload_stream(filename, None);
        upload.write_all(bytes).await?;
        upload.close().await?;
        Ok(upload.id().clone())
    }

    async fn insert_record(&self, record: &ClipRecord) -> Result<()> {
        self.accidents.insert_one(record, None).await?;
        Ok(())
    }
}
