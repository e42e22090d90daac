//! 配置管理
//!
//! 配置加载顺序：默认值 -> TOML 配置文件 -> 环境变量（前缀 `TUTOR`，分隔符 `__`）。
//!
//! ```rust,no_run
//! use tutor_core::config::AppConfig;
//!
//! let config = AppConfig::load(Some("config/tutor.toml")).unwrap();
//! println!("bind: {}", config.api.bind_address);
//! ```

pub mod models;

pub use models::*;
