// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # Exception 模块
//!
//! 该模块定义了请求处理生命周期中可能出现的各类异常情况。
//!
//! 每个变体都对应一个 HTTP 状态码（见 [`Exception::status_code`]），
//! 连接流水线据此把错误转换为同一连接上的错误响应，而不是让进程崩溃。

use std::fmt;
use std::io;

/// 服务器处理请求过程中发生的异常类型。
#[derive(Debug, Copy, Clone, PartialEq)]
pub enum Exception {
    /// 请求行无法解析为合法的 UTF-8 字符串。
    RequestIsNotUtf8,
    /// 请求行不足三段，通常是 HTTP/0.9 风格的旧客户端。
    MalformedRequest,
    /// 读取缓冲区已满仍未见到换行符。
    RequestTooLarge,
    /// 协议标记既不以 `HTTP/1.0` 也不以 `HTTP/1.1` 开头。
    UnsupportedProtocol,
    /// 无法识别的请求方法。
    UnknownVerb,
    /// 路径中含有 `..` 段。
    PathTraversal,
    /// 无法读取 public 目录下的源文件，携带底层错误类型以区分 404 与 500。
    SourceUnreadable(io::ErrorKind),
    /// 无法写入缓存文件。
    CacheUnwritable,
    /// 无法启动 PHP 解释器。
    InterpreterUnavailable,
    /// PHP 解释器以非零状态退出。
    InterpreterFailure,
    /// PHP 解释器运行超时，已被强制结束。
    InterpreterTimeout,
    /// 脚本源文件无法被脚本引擎加载。
    ScriptLoadFailed,
    /// 脚本执行失败。
    ScriptEngineFailure,
}

use Exception::*;

impl Exception {
    /// 该异常对应的 HTTP 状态码
    pub fn status_code(&self) -> u16 {
        match self {
            RequestIsNotUtf8 | MalformedRequest => 400,
            RequestTooLarge => 414,
            UnsupportedProtocol => 505,
            UnknownVerb => 501,
            PathTraversal => 403,
            SourceUnreadable(io::ErrorKind::NotFound) => 404,
            SourceUnreadable(_) => 500,
            CacheUnwritable
            | InterpreterUnavailable
            | InterpreterFailure
            | InterpreterTimeout
            | ScriptLoadFailed
            | ScriptEngineFailure => 500,
        }
    }

    /// 将 `io::Error` 归类为源文件读取失败
    pub fn from_source_error(err: &io::Error) -> Self {
        SourceUnreadable(err.kind())
    }
}

impl fmt::Display for Exception {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestIsNotUtf8 => write!(f, "Request line can't be parsed in UTF-8"),
            MalformedRequest => write!(f, "Malformed request line (HTTP/0.9?)"),
            RequestTooLarge => write!(f, "Request line exceeds the read buffer"),
            UnsupportedProtocol => write!(f, "Unsupported protocol"),
            UnknownVerb => write!(f, "Unknown request verb"),
            PathTraversal => write!(f, "Path escapes the public directory"),
            SourceUnreadable(kind) => write!(f, "Unable to load public file ({:?})", kind),
            CacheUnwritable => write!(f, "Unable to create cached file"),
            InterpreterUnavailable => write!(f, "Couldn't invoke PHP interpreter"),
            InterpreterFailure => write!(f, "PHP interpreter exited with an error"),
            InterpreterTimeout => write!(f, "PHP interpreter timed out"),
            ScriptLoadFailed => write!(f, "Script could not be loaded"),
            ScriptEngineFailure => write!(f, "Script execution failed"),
        }
    }
}

impl std::error::Error for Exception {}
