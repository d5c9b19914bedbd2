// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # 协议参数与常量模块
//!
//! 该模块定义了 Tiger 遵循的 HTTP 协议相关常量和数据结构，包括：
//! - 状态码及其原因短语（Reason Phrase）。
//! - 内置错误页的默认说明文字。
//! - HTTP 方法与协议版本的强类型枚举。

use std::collections::HashMap;
use std::fmt;

use lazy_static::lazy_static;

/// 服务器名称标识，用于 HTTP 响应头的 `Server` 字段
pub const SERVER_NAME: &str = "Tiger";

/// 服务器版本号，随 `Server` 头一起发送
pub const SERVER_VERSION: &str = env!("CARGO_PKG_VERSION");

/// HTTP 协议规定的换行符（Carriage Return Line Feed）
pub const CRLF: &str = "\r\n";

/// 响应状态行使用的协议版本。无论客户端使用 1.0 还是 1.1，服务端一律按 1.0 作答。
pub const RESPONSE_PROTOCOL: &str = "HTTP/1.0";

/// 单次读取请求的最大字节数。超出部分不会被读取。
pub const MAX_REQUEST_SIZE: usize = 8192;

/// 每个脚本最多可以声明的路由模式数量
pub const MAX_SCRIPT_PATTERNS: usize = 16;

/// 首页候选文件，按顺序检查
pub const INDEX_CANDIDATES: [&str; 2] = ["/index.html", "/index.php"];

/// 非脚本路由的 OPTIONS 请求返回的允许方法
pub const STATIC_ALLOW: &str = "OPTIONS, GET, HEAD";

/// 根目录下的固定子目录
pub const PUBLIC_DIR: &str = "public";
pub const CACHE_DIR: &str = "cache";
pub const SCRIPTS_DIR: &str = "scripts";
pub const CONFIG_DIR: &str = "config";

/// 脚本源文件的扩展名
pub const SCRIPT_EXTENSION: &str = "bns";

lazy_static! {
    /// 状态码与原因短语映射表。
    ///
    /// 不在表中的状态码仍会生成合法的状态行，只是原因短语为空。
    pub static ref STATUS_CODES: HashMap<u16, &'static str> = {
        let mut map = HashMap::new();
        map.insert(200, "OK");
        map.insert(201, "Created");
        map.insert(204, "No Content");
        map.insert(206, "Partial Content");
        map.insert(400, "Bad Request");
        map.insert(401, "Unauthorized");
        map.insert(403, "Forbidden");
        map.insert(404, "Not Found");
        map.insert(414, "URI Too Long");
        map.insert(418, "I'm A Teapot");
        map.insert(500, "Internal Server Error");
        map.insert(501, "Not Implemented");
        map.insert(503, "Service Unavailable");
        map.insert(505, "HTTP Version Not Supported");
        map.insert(507, "Insufficient Storage");
        map
    };
}

lazy_static! {
    /// 内置错误页的说明文字，在磁盘上没有 `NNN.html` 覆盖文件时使用。
    pub static ref ERROR_TEXTS: HashMap<u16, &'static str> = {
        let mut map = HashMap::new();
        map.insert(400, "Sorry, but your request could not be understood.");
        map.insert(401, "Sorry, but you are not authorized to view this resource.");
        map.insert(403, "Sorry, but you are forbidden from accessing this resource.");
        map.insert(404, "Sorry, but the requested resource could not be found.");
        map.insert(410, "Sorry, but the requested resource is not and will never be available again.");
        map.insert(418, "Sorry, but this server only brews tea. The server is a teapot.");
        map.insert(451, "Sorry, but the requested resource is not available due to legal reasons.");
        map.insert(500, "Sorry, but the server had a stroke trying to figure out what to do.");
        map.insert(503, "Sorry, but the server is overloaded and cannot handle the request.");
        map.insert(505, "Sorry, but your HTTP Version was not supported.");
        map
    };
}

/// 查询状态码的原因短语，未知状态码返回空串
pub fn reason_phrase(code: u16) -> &'static str {
    STATUS_CODES.get(&code).copied().unwrap_or("")
}

/// `Server` 响应头的取值，例如 `Tiger/0.2.0`
pub fn server_header() -> String {
    format!("{}/{}", SERVER_NAME, SERVER_VERSION)
}

/// 客户端声明的协议版本
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum HttpVersion {
    V1_0,
    V1_1,
}

impl HttpVersion {
    /// 按前缀识别协议标记，`HTTP/1.1xyz` 之类的尾随字符会被容忍
    pub fn from_token(token: &str) -> Option<Self> {
        if token.starts_with("HTTP/1.0") {
            Some(HttpVersion::V1_0)
        } else if token.starts_with("HTTP/1.1") {
            Some(HttpVersion::V1_1)
        } else {
            None
        }
    }
}

/// 可识别的 HTTP 请求方法
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum HttpRequestMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
    Head,
    Options,
}

impl HttpRequestMethod {
    /// 大小写敏感地匹配方法名
    pub fn from_token(token: &str) -> Option<Self> {
        match token {
            "GET" => Some(HttpRequestMethod::Get),
            "POST" => Some(HttpRequestMethod::Post),
            "PUT" => Some(HttpRequestMethod::Put),
            "PATCH" => Some(HttpRequestMethod::Patch),
            "DELETE" => Some(HttpRequestMethod::Delete),
            "HEAD" => Some(HttpRequestMethod::Head),
            "OPTIONS" => Some(HttpRequestMethod::Options),
            _ => None,
        }
    }
}

impl fmt::Display for HttpVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            HttpVersion::V1_0 => write!(f, "HTTP/1.0"),
            HttpVersion::V1_1 => write!(f, "HTTP/1.1"),
        }
    }
}

impl fmt::Display for HttpRequestMethod {
    /// 将枚举格式化为 HTTP 标准大写方法名
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            HttpRequestMethod::Get => write!(f, "GET"),
            HttpRequestMethod::Post => write!(f, "POST"),
            HttpRequestMethod::Put => write!(f, "PUT"),
            HttpRequestMethod::Patch => write!(f, "PATCH"),
            HttpRequestMethod::Delete => write!(f, "DELETE"),
            HttpRequestMethod::Head => write!(f, "HEAD"),
            HttpRequestMethod::Options => write!(f, "OPTIONS"),
        }
    }
}
