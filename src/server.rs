//! TCP 接入层：接受连接、IP 过滤、单次读取、写回响应、关闭。

use std::io;
use std::net::IpAddr;
use std::sync::Arc;

use log::{debug, error, info, warn};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{TcpListener, TcpStream},
    time::timeout,
};

use crate::{config::ServerConfig, param::MAX_REQUEST_SIZE, pipeline::Pipeline};

/// 持续接收新连接，每个连接交给一个独立的任务处理。正常情况下不会返回。
pub async fn serve(listener: TcpListener, pipeline: Arc<Pipeline>) {
    if let Ok(addr) = listener.local_addr() {
        info!("开始在{}上接受连接", addr);
    }
    let mut id: u128 = 0;
    loop {
        let (stream, addr) = match listener.accept().await {
            Ok(pair) => pair,
            Err(e) => {
                error!("接受TCP连接时出错：{}", e);
                continue;
            }
        };

        if !peer_allowed(pipeline.config(), addr.ip()) {
            debug!("[ID{}]拒绝来自{}的连接", id, addr);
            drop(stream);
            id += 1;
            continue;
        }
        debug!("[ID{}]TCP连接已建立：{}", id, addr);

        let pipeline = Arc::clone(&pipeline);
        tokio::spawn(async move {
            handle_connection(stream, id, pipeline).await;
        });
        id += 1;
    }
}

fn peer_allowed(config: &ServerConfig, ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => config.ip_allowed(v4),
        IpAddr::V6(v6) => v6.to_ipv4_mapped().map_or(false, |v4| config.ip_allowed(v4)),
    }
}

async fn handle_connection(mut stream: TcpStream, id: u128, pipeline: Arc<Pipeline>) {
    let mut buffer = vec![0u8; MAX_REQUEST_SIZE];
    let read_timeout = pipeline.config().tunables().read_timeout();

    let n = match timeout(read_timeout, stream.read(&mut buffer)).await {
        Ok(Ok(0)) => {
            debug!("[ID{}]客户端未发送数据即关闭连接", id);
            return;
        }
        Ok(Ok(n)) => n,
        Ok(Err(e)) => {
            error!("[ID{}]读取TCPStream时遇到错误：{}", id, e);
            return;
        }
        Err(_) => {
            warn!("[ID{}]{:?}内没有收到请求，关闭连接", id, read_timeout);
            return;
        }
    };
    buffer.truncate(n);
    debug!("[ID{}]HTTP请求接收完毕，{}字节", id, n);

    let worker = Arc::clone(&pipeline);
    let bytes = match tokio::task::spawn_blocking(move || worker.respond(&buffer, id)).await {
        Ok(bytes) => bytes,
        Err(e) => {
            error!("[ID{}]处理请求的任务异常结束：{}", id, e);
            return;
        }
    };

    if let Err(e) = stream.write_all(&bytes).await {
        if e.kind() == io::ErrorKind::BrokenPipe {
            debug!("[ID{}]发送响应失败(Probably Bogus)：{}", id, e);
        } else {
            error!("[ID{}]发送响应失败：{}", id, e);
        }
        return;
    }
    let _ = stream.shutdown().await;
    debug!("[ID{}]连接已关闭", id);
}
