//! 内置的模板脚本引擎。
//!
//! `.bns` 源文件以若干指令行开头，空行之后是响应正文：
//!
//! ```text
//! @route /api/*
//! @route /v1/*
//! @status 200
//!
//! <p>{{verb}} {{truepath}} ({{query}})</p>
//! ```
//!
//! 正文中的 `{{verb}}`、`{{path}}`、`{{truepath}}`、`{{query}}`、`{{protocol}}`
//! 会被替换为请求中的对应字段。

use glob::Pattern;
use lazy_static::lazy_static;
use log::error;
use regex::{Captures, Regex};

use crate::{
    exception::Exception,
    param::{reason_phrase, server_header, CRLF, RESPONSE_PROTOCOL},
    request::Request,
    script::{CompiledScript, LoadedScript, ScriptEngine},
};

lazy_static! {
    static ref PLACEHOLDER: Regex =
        Regex::new(r"\{\{(verb|path|truepath|query|protocol)\}\}").unwrap();
}

#[derive(Debug, Default, Clone, Copy)]
pub struct TemplateEngine;

struct Template {
    status: u16,
    body: String,
}

impl ScriptEngine for TemplateEngine {
    fn load(&self, source: &[u8]) -> Result<LoadedScript, Exception> {
        let source = std::str::from_utf8(source).map_err(|_| {
            error!("脚本不是合法的UTF-8");
            Exception::ScriptLoadFailed
        })?;

        let mut patterns = Vec::new();
        let mut status = 200;
        let mut consumed = 0;
        for line in source.split_inclusive('\n') {
            consumed += line.len();
            let directive = line.trim();
            if directive.is_empty() {
                break;
            }
            if let Some(glob) = directive.strip_prefix("@route ") {
                let pattern = Pattern::new(glob.trim()).map_err(|e| {
                    error!("无效的路由模式{}：{}", glob, e);
                    Exception::ScriptLoadFailed
                })?;
                patterns.push(pattern);
            } else if let Some(code) = directive.strip_prefix("@status ") {
                status = match code.trim().parse::<u16>() {
                    Ok(c) if (100..1000).contains(&c) => c,
                    _ => {
                        error!("无效的状态码：{}", code);
                        return Err(Exception::ScriptLoadFailed);
                    }
                };
            } else {
                error!("无法识别的脚本指令：{}", directive);
                return Err(Exception::ScriptLoadFailed);
            }
        }

        if patterns.is_empty() {
            error!("脚本没有声明任何 @route");
            return Err(Exception::ScriptLoadFailed);
        }

        let body = source[consumed..].to_string();
        Ok(LoadedScript::new(patterns, Box::new(Template { status, body })))
    }
}

impl CompiledScript for Template {
    fn exec(&self, request: &Request) -> Result<Vec<u8>, Exception> {
        // 单次扫描，替换进来的字段不会再被当作占位符
        let body = PLACEHOLDER.replace_all(&self.body, |caps: &Captures| match &caps[1] {
            "verb" => request.method().to_string(),
            "path" => request.path().to_string(),
            "truepath" => request.true_path().to_string(),
            "query" => request.query().unwrap_or("").to_string(),
            _ => request.protocol().to_string(),
        });
        let head = format!(
            "{} {} {}{}Server: {}{}{}",
            RESPONSE_PROTOCOL,
            self.status,
            reason_phrase(self.status),
            CRLF,
            server_header(),
            CRLF,
            CRLF
        );
        Ok([head.as_bytes(), body.as_bytes()].concat())
    }
}
