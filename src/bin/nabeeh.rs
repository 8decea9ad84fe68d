/// Nabeeh (نبيه) 道路事故监测
///
/// 系统架构:
/// 1. 采集线程: 摄像头解码 (独立工作线程)
/// 2. 处理线程: 事故检测 + 车辆计数 + 推流 (独立工作线程)
/// 3. 归档任务: 片段编码 → 本地文件 → GridFS → accidents 集合
/// 4. 倒计时任务: 每秒递减事故倒计时
/// 5. HTTP 服务: / /video_feed /get_status
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::sync::{mpsc, watch};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use nabeeh::archive::{ClipArchiver, FfmpegClipEncoder, MongoClipStore};
use nabeeh::detection::{AccidentDetector, VehicleCounter};
use nabeeh::incident::{spawn_countdown, SharedIncident};
use nabeeh::input::CameraDecoder;
use nabeeh::pipeline::FrameProcessor;
use nabeeh::routes::GoogleDirections;
use nabeeh::server::{self, AppState};
use nabeeh::{Args, Model, YOLOv8};

/// 帧队列容量; 处理跟不上时丢弃新帧
const FRAME_QUEUE: usize = 2;
const CLIP_QUEUE: usize = 4;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    args.validate()?;

    info!("🚀 Nabeeh 事故监测启动");
    info!("📦 事故模型: {}", args.accident_model.display());
    info!("📦 计数模型: {}", args.count_model.display());
    info!("📍 位置: ({}, {})", args.lat, args.lng);

    // ========== 数据库 ==========
    let store = MongoClipStore::connect(&args.mongodb_uri, &args.database)
        .await
        .context("MongoDB 连接失败")?;

    // ========== 模型 ==========
    let accident_model = YOLOv8::new(args.accident_model_config())
        .with_context(|| format!("事故模型加载失败: {}", args.accident_model.display()))?;
    accident_model.summary();
    let count_model = YOLOv8::new(args.count_model_config())
        .with_context(|| format!("计数模型加载失败: {}", args.count_model.display()))?;
    count_model.summary();
    info!("✅ 模型加载成功");

    if args.maps_api_key.is_empty() {
        warn!("⚠️ 未设置 GOOGLE_MAPS_API_KEY, 备选路线时间将显示 N/A");
    }

    // ========== 共享状态与队列 ==========
    let incident = SharedIncident::new();
    let (frame_tx, frame_rx) = crossbeam_channel::bounded(FRAME_QUEUE);
    let (clip_tx, clip_rx) = mpsc::channel(CLIP_QUEUE);
    let (stream_tx, stream_rx) = watch::channel(None);

    // ========== 归档任务 / 倒计时任务 ==========
    let archiver = ClipArchiver::new(
        &args.clip_dir,
        args.clip_fps,
        Arc::new(FfmpegClipEncoder::default()),
        Arc::new(store),
    );
    archiver.spawn(clip_rx);
    spawn_countdown(incident.clone(), args.countdown_period());

    // ========== 采集线程 ==========
    let camera = CameraDecoder::new(args.camera_config());
    std::thread::Builder::new()
        .name("capture".to_string())
        .spawn(move || {
            if let Err(e) = camera.run(frame_tx) {
                error!("❌ 采集线程退出: {}", e);
            }
        })?;

    // ========== 处理线程 ==========
    let processor = FrameProcessor::new(
        AccidentDetector::new(Box::new(accident_model), args.threshold),
        VehicleCounter::new(Box::new(count_model)),
        incident.clone(),
        args.pipeline_config(),
        clip_tx,
        stream_tx,
    );
    std::thread::Builder::new()
        .name("pipeline".to_string())
        .spawn(move || processor.run(frame_rx))?;

    // ========== HTTP 服务 ==========
    let state = AppState {
        incident,
        frames: stream_rx,
        directions: Arc::new(GoogleDirections::new(args.maps_api_key.clone())),
    };
    let listener = tokio::net::TcpListener::bind(args.bind)
        .await
        .with_context(|| format!("无法监听 {}", args.bind))?;
    info!("🌐 HTTP 服务: http://{}", args.bind);

    axum::serve(listener, server::router(state))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("👋 收到退出信号");
        })
        .await?;
    Ok(())
}
