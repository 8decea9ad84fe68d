/// ONNX Runtime 推理后端
/// ONNX Runtime session wrapper (execution provider, input geometry, class names)
use ndarray::{Array, IxDyn};
use once_cell::sync::Lazy;
use ort::execution_providers::{
    CPUExecutionProvider, CUDAExecutionProvider, ExecutionProviderDispatch,
    TensorRTExecutionProvider,
};
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use regex::Regex;
use tracing::{debug, info};

use crate::error::{Error, Result};

/// ultralytics 导出模型的 metadata: names = "{0: 'accident', 1: 'car'}"
static NAMES_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(['"])([-()\w '"]+)(['"])"#).expect("names regex"));

/// 推理设备
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrtEP {
    CPU,
    CUDA(i32),
    Trt(i32),
}

#[derive(Debug, Clone)]
pub struct OrtConfig {
    pub f: String,
    pub ep: OrtEP,
    /// 动态输入时使用的 (height, width)
    pub image_size: (Option<u32>, Option<u32>),
}

pub struct OrtBackend {
    session: Session,
    ep: OrtEP,
    height: u32,
    width: u32,
    input_name: String,
    output_name: String,
    names: Option<Vec<String>>,
}

impl OrtBackend {
    pub fn build(config: OrtConfig) -> Result<Self> {
        let providers: Vec<ExecutionProviderDispatch> = match config.ep {
            OrtEP::Trt(id) => vec![
                TensorRTExecutionProvider::default()
                    .with_device_id(id)
                    .build(),
                CUDAExecutionProvider::default().with_device_id(id).build(),
            ],
            OrtEP::CUDA(id) => vec![CUDAExecutionProvider::default().with_device_id(id).build()],
            OrtEP::CPU => vec![CPUExecutionProvider::default().build()],
        };

        let session = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_execution_providers(providers)?
            .commit_from_file(&config.f)?;

        let input = session
            .inputs
            .first()
            .ok_or_else(|| Error::Model(format!("{}: model has no inputs", config.f)))?;
        let output = session
            .outputs
            .first()
            .ok_or_else(|| Error::Model(format!("{}: model has no outputs", config.f)))?;

        // NCHW, 动态维度为 -1
        let dims = input
            .input_type
            .tensor_dimensions()
            .cloned()
            .ok_or_else(|| Error::Model(format!("{}: input is not a tensor", config.f)))?;
        if dims.len() != 4 {
            return Err(Error::Model(format!(
                "{}: expected NCHW input, got {:?}",
                config.f, dims
            )));
        }
        let height = resolve_dim(dims[2], config.image_size.0, "height")?;
        let width = resolve_dim(dims[3], config.image_size.1, "width")?;

        let names = session
            .metadata()
            .ok()
            .and_then(|m| m.custom("names").ok().flatten())
            .map(|raw| parse_names(&raw));

        let backend = Self {
            input_name: input.name.clone(),
            output_name: output.name.clone(),
            session,
            ep: config.ep,
            height,
            width,
            names,
        };
        info!(
            "📦 模型加载完成: {} | EP: {:?} | 输入: {}x{} | 类别: {}",
            config.f,
            backend.ep,
            backend.width,
            backend.height,
            backend.names.as_ref().map(|n| n.len()).unwrap_or(0)
        );
        Ok(backend)
    }

    /// 执行前向推理, 返回第一个输出张量
    pub fn run(&self, xs: Array<f32, IxDyn>) -> Result<Array<f32, IxDyn>> {
        let t = std::time::Instant::now();
        let outputs = self
            .session
            .run(ort::inputs![self.input_name.as_str() => xs.view()]?)?;
        let ys = outputs[self.output_name.as_str()]
            .try_extract_tensor::<f32>()?
            .into_owned();
        debug!("[Model Inference]: {:?}", t.elapsed());
        Ok(ys)
    }

    pub fn ep(&self) -> OrtEP {
        self.ep
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn names(&self) -> Option<&[String]> {
        self.names.as_deref()
    }
}

fn resolve_dim(dim: i64, fallback: Option<u32>, what: &str) -> Result<u32> {
    if dim > 0 {
        return Ok(dim as u32);
    }
    fallback.ok_or_else(|| {
        Error::Model(format!(
            "dynamic input {} in model, make it explicit with `--{}`",
            what, what
        ))
    })
}

fn parse_names(raw: &str) -> Vec<String> {
    NAMES_RE
        .captures_iter(raw)
        .map(|c| c.extract::<3>().1[1].to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_names() {
        let names = parse_names("{0: 'accident', 1: 'moderate crash', 2: \"car\"}");
        assert_eq!(names, vec!["accident", "moderate crash", "car"]);
    }

    #[test]
    fn test_resolve_dim() {
        assert_eq!(resolve_dim(640, None, "height").unwrap(), 640);
        assert_eq!(resolve_dim(-1, Some(320), "height").unwrap(), 320);
        assert!(resolve_dim(-1, None, "width").is_err());
    }
}
