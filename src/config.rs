use serde_derive::Deserialize;

use log::{error, warn};
use std::fs;
use std::io;
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::param::{CACHE_DIR, CONFIG_DIR, PUBLIC_DIR, SCRIPTS_DIR};

/// 可调参数文件名，位于 `<root>/config/` 下
pub const TUNABLES_FILE: &str = "tiger.toml";

/// 运行时可调参数，来自可选的 TOML 文件。
#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct Tunables {
    #[serde(default)]
    worker_threads: usize,
    #[serde(default = "default_read_timeout")]
    read_timeout: u64,
    #[serde(default = "default_php_binary")]
    php_binary: String,
    #[serde(default = "default_php_timeout")]
    php_timeout: u64,
}

fn default_read_timeout() -> u64 {
    10
}

fn default_php_binary() -> String {
    "php".to_string()
}

fn default_php_timeout() -> u64 {
    30
}

impl Default for Tunables {
    fn default() -> Self {
        Self {
            worker_threads: 0,
            read_timeout: default_read_timeout(),
            php_binary: default_php_binary(),
            php_timeout: default_php_timeout(),
        }
    }
}

impl Tunables {
    /// 从 TOML 文本构建；解析失败时记录错误并退回默认值
    pub fn from_toml_str(text: &str) -> Self {
        let mut raw: Tunables = match toml::from_str(text) {
            Ok(t) => t,
            Err(e) => {
                error!("无法从配置文件构建配置对象，使用默认配置：{}", e);
                Tunables::default()
            }
        };
        if raw.worker_threads == 0 {
            raw.worker_threads = num_cpus::get();
        }
        raw
    }

    /// 读取 `<root>/config/tiger.toml`，文件不存在时使用默认值
    pub fn from_root(root: &Path) -> Self {
        let filename = root.join(CONFIG_DIR).join(TUNABLES_FILE);
        match fs::read_to_string(&filename) {
            Ok(text) => Self::from_toml_str(&text),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Self::from_toml_str(""),
            Err(e) => {
                warn!("无法读取配置文件{}：{}，使用默认配置", filename.display(), e);
                Self::from_toml_str("")
            }
        }
    }

    pub fn worker_threads(&self) -> usize {
        self.worker_threads
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout)
    }

    pub fn php_binary(&self) -> &str {
        &self.php_binary
    }

    pub fn php_timeout(&self) -> Duration {
        Duration::from_secs(self.php_timeout)
    }
}

/// 进程级配置。启动前构建完毕，之后只读共享。
#[derive(Debug, Clone)]
pub struct ServerConfig {
    port: u16,
    root: PathBuf,
    whitelist: Option<Ipv4Addr>,
    mask: Option<Ipv4Addr>,
    disable_cache: bool,
    disable_redirect: bool,
    disable_error_pages: bool,
    tunables: Tunables,
}

impl ServerConfig {
    pub fn new(port: u16, root: PathBuf) -> Self {
        Self {
            port,
            root,
            whitelist: None,
            mask: None,
            disable_cache: false,
            disable_redirect: false,
            disable_error_pages: false,
            tunables: Tunables::default(),
        }
    }

    pub fn with_whitelist(mut self, whitelist: Option<Ipv4Addr>, mask: Option<Ipv4Addr>) -> Self {
        if whitelist.is_none() && mask.is_some() {
            warn!("指定了IP掩码但没有指定白名单，掩码将被忽略");
        }
        self.whitelist = whitelist;
        self.mask = mask;
        self
    }

    pub fn with_cache_disabled(mut self, disabled: bool) -> Self {
        self.disable_cache = disabled;
        self
    }

    pub fn with_redirect_disabled(mut self, disabled: bool) -> Self {
        self.disable_redirect = disabled;
        self
    }

    pub fn with_error_pages_disabled(mut self, disabled: bool) -> Self {
        self.disable_error_pages = disabled;
        self
    }

    pub fn with_tunables(mut self, tunables: Tunables) -> Self {
        self.tunables = tunables;
        self
    }

    /// 对端地址是否允许访问。
    ///
    /// 未配置白名单时全部放行；否则比较掩码后的地址，掩码缺省为
    /// `255.255.255.255`，即精确匹配。
    pub fn ip_allowed(&self, peer: Ipv4Addr) -> bool {
        match self.whitelist {
            None => true,
            Some(whitelist) => {
                let mask = u32::from(self.mask.unwrap_or(Ipv4Addr::BROADCAST));
                u32::from(peer) & mask == u32::from(whitelist) & mask
            }
        }
    }
}

impl ServerConfig {
    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn public_dir(&self) -> PathBuf {
        self.root.join(PUBLIC_DIR)
    }

    pub fn cache_dir(&self) -> PathBuf {
        self.root.join(CACHE_DIR)
    }

    pub fn scripts_dir(&self) -> PathBuf {
        self.root.join(SCRIPTS_DIR)
    }

    pub fn disable_cache(&self) -> bool {
        self.disable_cache
    }

    pub fn disable_redirect(&self) -> bool {
        self.disable_redirect
    }

    pub fn disable_error_pages(&self) -> bool {
        self.disable_error_pages
    }

    pub fn tunables(&self) -> &Tunables {
        &self.tunables
    }
}

/// 解析点分十进制或 `0x` 前缀的十六进制 IPv4 地址
pub fn parse_ip(s: &str) -> Result<Ipv4Addr, String> {
    let s = s.trim();
    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        return u32::from_str_radix(hex, 16)
            .map(Ipv4Addr::from)
            .map_err(|e| format!("无效的十六进制IP地址{}：{}", s, e));
    }
    s.parse::<Ipv4Addr>()
        .map_err(|e| format!("无效的IP地址{}：{}", s, e))
}
