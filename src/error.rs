/// 统一错误类型
/// Library-wide error type
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("onnx runtime: {0}")]
    Ort(#[from] ort::Error),

    #[error("model: {0}")]
    Model(String),

    #[error("tensor shape: {0}")]
    Shape(#[from] ndarray::ShapeError),

    #[error("image: {0}")]
    Image(#[from] image::ImageError),

    #[error("camera: {0}")]
    Camera(String),

    #[error("clip encode: {0}")]
    Encode(String),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("database: {0}")]
    Database(#[from] mongodb::error::Error),

    #[error("directions: {0}")]
    Directions(String),

    #[error("config: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, Error>;
