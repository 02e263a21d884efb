//! 全局配置结构（Config）与默认值。
//!
//! 该模块同时提供生成 `config.yml` 的字段元信息。

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::config::{ConfigError, ConfigSpec, FieldMeta};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    // 网络配置
    #[serde(default = "default_request_timeout")]
    pub request_timeout: u64,
    #[serde(default = "default_max_wait_time")]
    pub max_wait_time: u64,
    #[serde(default = "default_min_wait_time")]
    pub min_wait_time: u64,
    #[serde(default = "default_loan_token_refresh")]
    pub loan_token_refresh: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    // 下载配置
    #[serde(default)]
    pub default_scale: u32,

    // 路径配置
    #[serde(default)]
    pub save_path: String,
    #[serde(default = "default_true")]
    pub confirm_existing_dir: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            request_timeout: default_request_timeout(),
            max_wait_time: default_max_wait_time(),
            min_wait_time: default_min_wait_time(),
            loan_token_refresh: default_loan_token_refresh(),
            user_agent: default_user_agent(),
            default_scale: 0,
            save_path: String::new(),
            confirm_existing_dir: default_true(),
        }
    }
}

impl ConfigSpec for Config {
    const FILE_NAME: &'static str = "config.yml";

    fn fields() -> &'static [FieldMeta] {
        static FIELDS: [FieldMeta; 8] = [
            FieldMeta {
                section: "网络",
                name: "request_timeout",
                description: "请求超时时间（秒）",
            },
            FieldMeta {
                section: "网络",
                name: "max_wait_time",
                description: "两次页面请求之间的最大间隔, 单位ms",
            },
            FieldMeta {
                section: "网络",
                name: "min_wait_time",
                description: "两次页面请求之间的最小间隔, 单位ms",
            },
            FieldMeta {
                section: "网络",
                name: "loan_token_refresh",
                description: "借阅令牌刷新周期（秒）",
            },
            FieldMeta {
                section: "网络",
                name: "user_agent",
                description: "请求使用的 User-Agent",
            },
            FieldMeta {
                section: "下载",
                name: "default_scale",
                description: "默认图片缩放等级, 0 为原始分辨率, 数值越大分辨率越低",
            },
            FieldMeta {
                section: "保存",
                name: "save_path",
                description: "保存路径, 留空为当前目录",
            },
            FieldMeta {
                section: "保存",
                name: "confirm_existing_dir",
                description: "输出目录已存在且非空时是否询问继续",
            },
        ];
        &FIELDS
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.min_wait_time > self.max_wait_time {
            return Err(ConfigError::Validation(format!(
                "min_wait_time ({}) 不能大于 max_wait_time ({})",
                self.min_wait_time, self.max_wait_time
            )));
        }
        if self.request_timeout == 0 {
            return Err(ConfigError::Validation(
                "request_timeout 必须大于 0".to_string(),
            ));
        }
        Ok(())
    }
}

impl Config {
    pub fn default_save_dir(&self) -> PathBuf {
        if self.save_path.trim().is_empty() {
            std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
        } else {
            PathBuf::from(&self.save_path)
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout)
    }

    /// 页面请求间隔区间 `[min, max]`。
    pub fn wait_bounds(&self) -> (Duration, Duration) {
        (
            Duration::from_millis(self.min_wait_time),
            Duration::from_millis(self.max_wait_time),
        )
    }

    pub fn loan_token_refresh(&self) -> Duration {
        Duration::from_secs(self.loan_token_refresh)
    }
}

pub fn safe_fs_name(name: &str, replacement: &str, max_len: usize) -> String {
    let fallback = replacement.chars().next().unwrap_or('_');
    let mut cleaned: String = name
        .trim()
        .chars()
        .map(|ch| match ch {
            ':' | '"' | '<' | '>' | '/' | '\\' | '|' | '?' | '*' => fallback,
            c if (c as u32) < 32 => fallback,
            _ => ch,
        })
        .collect();

    while cleaned.ends_with(' ') || cleaned.ends_with('.') {
        cleaned.pop();
    }

    const RESERVED: [&str; 22] = [
        "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8",
        "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
    ];
    if RESERVED.contains(&cleaned.to_uppercase().as_str()) {
        cleaned = format!("_{}", cleaned);
    }

    if cleaned.len() > max_len {
        let mut end = max_len;
        while !cleaned.is_char_boundary(end) && end > 0 {
            end -= 1;
        }
        cleaned.truncate(end);
    }

    if cleaned.is_empty() {
        cleaned.push_str("unnamed");
    }
    cleaned
}

fn default_true() -> bool {
    true
}

fn default_request_timeout() -> u64 {
    30
}

fn default_max_wait_time() -> u64 {
    3000
}

fn default_min_wait_time() -> u64 {
    1000
}

fn default_loan_token_refresh() -> u64 {
    120
}

fn default_user_agent() -> String {
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120 Safari/537.36".to_string()
}
