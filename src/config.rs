use serde::Deserialize;
use std::fs;
use std::path::Path;
use thiserror::Error;

use crate::pipeline::PipelineOptions;
use crate::registrar::DEFAULT_BATCH_SIZE;
use crate::upload_queue::DEFAULT_CONCURRENCY;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("读取配置文件失败: {0}")]
    Io(#[from] std::io::Error),
    #[error("配置文件格式错误: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("配置无效: {0}")]
    Invalid(String),
}

/// 上传工具配置
///
/// 从 TOML 文件读取，缺省字段使用默认值。示例：
///
/// ```toml
/// api_base_url = "https://api.ngoctieucac.vn/api"
/// api_token = "..."
/// concurrency = 5
/// batch_size = 100
/// ```
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct IngestConfig {
    /// 后端 API 根地址
    pub api_base_url: String,
    /// 后端接口的 Bearer token（对象存储上传不使用）
    pub api_token: Option<String>,
    /// 同时进行的上传数
    pub concurrency: usize,
    /// 每批注册的章节数
    pub batch_size: usize,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            api_base_url: "http://localhost:8080/api".to_string(),
            api_token: None,
            concurrency: DEFAULT_CONCURRENCY,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }
}

impl IngestConfig {
    /// 读取配置；未指定文件时使用默认配置
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let config = match path {
            Some(path) => {
                let content = fs::read_to_string(path)?;
                let config: IngestConfig = toml::from_str(&content)?;
                tracing::debug!(path = %path.display(), "已加载配置文件");
                config
            }
            None => IngestConfig::default(),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.concurrency == 0 {
            return Err(ConfigError::Invalid("concurrency 必须大于 0".to_string()));
        }
        if self.batch_size == 0 {
            return Err(ConfigError::Invalid("batch_size 必须大于 0".to_string()));
        }
        if reqwest::Url::parse(&self.api_base_url).is_err() {
            return Err(ConfigError::Invalid(format!(
                "api_base_url 不是合法地址: {}",
                self.api_base_url
            )));
        }
        Ok(())
    }

    pub fn pipeline_options(&self) -> PipelineOptions {
        PipelineOptions {
            batch_size: self.batch_size,
            concurrency: self.concurrency,
        }
    }
}
