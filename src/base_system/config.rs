//! `config.yml` 的加载、补全与带注释写出。
//!
//! 用户文件按字段覆盖默认值；缺少的字段会补上默认值并回写，
//! 写出时按 [`FieldMeta::section`] 分组并附上中文说明。

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_yaml::{Mapping, Value};
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("读写配置文件 {path} 失败: {source}")]
    Io { path: PathBuf, source: io::Error },
    #[error("配置文件 {path} 不是合法的 YAML: {source}")]
    Parse {
        path: PathBuf,
        source: serde_yaml::Error,
    },
    #[error("配置项无效: {0}")]
    Validation(String),
}

/// 单个配置项的说明，用于生成带注释的配置文件。
#[derive(Debug, Clone, Copy)]
pub struct FieldMeta {
    pub section: &'static str,
    pub name: &'static str,
    pub description: &'static str,
}

pub trait ConfigSpec: Serialize + DeserializeOwned + Default {
    const FILE_NAME: &'static str;

    /// 写出顺序即此处顺序；未列出的字段不会写入文件。
    fn fields() -> &'static [FieldMeta];

    /// 合并完成后的语义校验。
    fn validate(&self) -> Result<(), ConfigError> {
        Ok(())
    }
}

/// 读取 `<base_dir>/FILE_NAME`（`base_dir` 为 `None` 时为当前目录），
/// 不存在则写出默认配置。
pub fn load_or_create_with_base<T: ConfigSpec>(base_dir: Option<&Path>) -> Result<T, ConfigError> {
    let path = base_dir.map_or_else(|| PathBuf::from(T::FILE_NAME), |b| b.join(T::FILE_NAME));

    let Some(user) = read_user_yaml(&path)? else {
        let config = T::default();
        write_with_comments(&config, &path)?;
        info!(target: "config", "已生成默认配置 {}", path.display());
        return Ok(config);
    };

    let backfill = !has_all_fields::<T>(&user);
    let mut merged = to_yaml(&T::default())?;
    overlay(&mut merged, user);
    let config: T = serde_yaml::from_value(merged).map_err(|source| ConfigError::Parse {
        path: path.clone(),
        source,
    })?;
    config.validate()?;

    if backfill {
        debug!(target: "config", "补全缺失的配置项并回写 {}", path.display());
        write_with_comments(&config, &path)?;
    }
    Ok(config)
}

pub fn write_with_comments<T: ConfigSpec>(config: &T, path: &Path) -> Result<(), ConfigError> {
    let io_err = |path: &Path| {
        let path = path.to_path_buf();
        move |source| ConfigError::Io { path, source }
    };
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(io_err(parent))?;
    }
    fs::write(path, generate_yaml_with_comments(config)?).map_err(io_err(path))
}

pub fn generate_yaml_with_comments<T: ConfigSpec>(config: &T) -> Result<String, ConfigError> {
    let Value::Mapping(values) = to_yaml(config)? else {
        return Err(ConfigError::Validation("配置必须序列化为映射".to_string()));
    };

    let mut out = String::new();
    let mut section = "";
    for field in T::fields() {
        if field.section != section {
            if !out.is_empty() {
                out.push('\n');
            }
            out.push_str(&format!("# ===== {} =====\n", field.section));
            section = field.section;
        }
        for line in field.description.lines() {
            out.push_str(&format!("# {line}\n"));
        }
        let key = Value::from(field.name);
        let value = values.get(&key).cloned().unwrap_or(Value::Null);
        let entry = serde_yaml::to_string(&Mapping::from_iter([(key, value)]))
            .map_err(|e| ConfigError::Validation(e.to_string()))?;
        out.push_str(entry.trim_end());
        out.push('\n');
    }
    Ok(out)
}

/// 文件不存在返回 `None`。
fn read_user_yaml(path: &Path) -> Result<Option<Value>, ConfigError> {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            return Err(ConfigError::Io {
                path: path.to_path_buf(),
                source,
            });
        }
    };
    serde_yaml::from_str(&raw)
        .map(Some)
        .map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
}

fn to_yaml<T: Serialize>(value: &T) -> Result<Value, ConfigError> {
    serde_yaml::to_value(value).map_err(|e| ConfigError::Validation(e.to_string()))
}

fn has_all_fields<T: ConfigSpec>(user: &Value) -> bool {
    let Value::Mapping(map) = user else {
        return false;
    };
    T::fields().iter().all(|f| map.contains_key(f.name))
}

/// 把用户的值逐层覆盖到默认值上；用户写了 `~` 或空值的字段保留默认。
fn overlay(base: &mut Value, user: Value) {
    match (base, user) {
        (_, Value::Null) => {}
        (Value::Mapping(base), Value::Mapping(user)) => {
            for (key, value) in user {
                match base.get_mut(&key) {
                    Some(slot) => overlay(slot, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (slot, value) => *slot = value,
    }
}
