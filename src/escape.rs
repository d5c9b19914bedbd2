//! 请求路径到缓存文件名的转义。
//!
//! 输出只包含一个路径分量（不含 `/`），可以直接拼在 `cache/` 目录之后。
//! `0x20..=0x7F` 区间内除 `/` 以外的字节（含 DEL）以带长度前缀的片段原样保留，其余字节拆成两个小写字母。

/// 单个片段最多携带的字节数，长度前缀因此落在 `'B'..='Z'` 之间
const MAX_RUN: usize = 25;

fn is_plain(byte: u8) -> bool {
    (0x20..0x80).contains(&byte) && byte != b'/'
}

/// 将任意字节序列转义为文件系统安全的缓存键
pub fn escape(path: &[u8]) -> String {
    let mut out = String::with_capacity(path.len() * 2);
    let mut i = 0;
    while i < path.len() {
        let run = path[i..]
            .iter()
            .take(MAX_RUN)
            .take_while(|&&b| is_plain(b))
            .count();
        if run > 0 {
            out.push((b'A' + run as u8) as char);
            // 片段内均为 0x20..0x80 的字节，逐字节转 char 不会改变内容
            out.extend(path[i..i + run].iter().map(|&b| b as char));
            i += run;
        } else {
            let byte = path[i];
            out.push((b'a' + (byte >> 4)) as char);
            out.push((b'a' + (byte & 0x0F)) as char);
            i += 1;
        }
    }
    out
}
