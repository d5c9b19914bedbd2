use bytes::Bytes;

use crate::param::*;

/// 静态文件、OPTIONS 与错误页共用的响应。
///
/// 线路格式刻意保持最小：状态行、`Server` 头、可选的 `Allow` 头、空行、正文。
/// 不发送 `Content-Length` 与 `Content-Type`，连接关闭即表示正文结束。
#[derive(Debug, Clone)]
pub struct Response {
    status_code: u16,
    information: String,
    server_name: String,
    allow: Option<String>,
    content: Option<Bytes>,
}

impl Response {
    pub fn new() -> Self {
        Self {
            status_code: 200,
            information: "OK".to_string(),
            server_name: server_header(),
            allow: None,
            content: None,
        }
    }

    /// 200 响应，正文为文件内容
    pub fn from_content(content: Bytes) -> Self {
        let mut response = Self::new();
        response.content = Some(content);
        response
    }

    /// 非脚本路由的 OPTIONS 应答
    pub fn options() -> Self {
        let mut response = Self::new();
        response.allow = Some(STATIC_ALLOW.to_string());
        response
    }

    pub fn set_code(&mut self, code: u16) -> &mut Self {
        self.status_code = code;
        self.information = reason_phrase(code).to_string();
        self
    }

    /// HEAD 请求不携带正文
    pub fn strip_content(&mut self) -> &mut Self {
        self.content = None;
        self
    }

    /// 只序列化状态行与响应头（含结尾空行）
    pub fn head_bytes(&self) -> Vec<u8> {
        let status_code: &str = &self.status_code.to_string();
        let information: &str = &self.information;
        let server: &str = &self.server_name;
        [
            RESPONSE_PROTOCOL,
            " ",
            status_code,
            " ",
            information,
            CRLF,
            "Server: ",
            server,
            CRLF,
            match &self.allow {
                Some(a) => ["Allow: ", a, CRLF].concat(),
                None => "".to_string(),
            }
            .as_str(),
            CRLF,
        ]
        .concat()
        .into_bytes()
    }

    pub fn as_bytes(&self) -> Vec<u8> {
        let mut bytes = self.head_bytes();
        if let Some(c) = &self.content {
            bytes.extend_from_slice(c);
        }
        bytes
    }
}

impl Default for Response {
    fn default() -> Self {
        Self::new()
    }
}

impl Response {
    pub fn status_code(&self) -> u16 {
        self.status_code
    }

    pub fn information(&self) -> &str {
        &self.information
    }

    pub fn content_length(&self) -> usize {
        self.content.as_ref().map_or(0, |c| c.len())
    }
}
