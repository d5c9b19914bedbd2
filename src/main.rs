// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # Tiger Web 服务器
//!
//! 启动流程：
//! 1. 解析命令行，切换到服务器根目录
//! 2. 处理守护进程指令（必须在创建运行时之前完成 fork）
//! 3. 初始化日志与崩溃钩子
//! 4. 读取可调参数、探测 PHP、加载脚本
//! 5. 构建多线程运行时并开始监听

use std::{
    env,
    net::{Ipv4Addr, SocketAddrV4},
    path::{Path, PathBuf},
    process,
    sync::Arc,
};

use clap::Parser;
use log::{error, info, warn, LevelFilter};
use log4rs::{
    append::console::{ConsoleAppender, Target},
    config::{Appender, Config, Root},
    encode::pattern::PatternEncoder,
    filter::threshold::ThresholdFilter,
};
use tokio::{net::TcpListener, runtime::Builder};

use tiger::{
    config::{parse_ip, ServerConfig, Tunables},
    daemon::{self, DaemonCommand},
    param::{server_header, CONFIG_DIR},
    pipeline::Pipeline,
    script::ScriptTable,
    server,
    template::TemplateEngine,
    util::probe_php,
};

const LOG_CONFIG_FILE: &str = "log4rs.yaml";
const LOG_PATTERN: &str = "{d(%Y-%m-%d %H:%M:%S)} {h({l})} {m}{n}";

#[derive(Parser, Debug)]
#[command(name = "tiger", version, about = "A small HTTP/1.0 web server")]
struct Cli {
    /// 监听端口
    #[arg(short = 'p', long)]
    port: Option<u16>,

    /// 只允许该地址（配合 -m 可以放行一个网段）
    #[arg(short = 'i', long = "whitelist", value_parser = parse_ip)]
    whitelist: Option<Ipv4Addr>,

    /// 白名单掩码
    #[arg(short = 'm', long = "mask", value_parser = parse_ip)]
    mask: Option<Ipv4Addr>,

    /// 服务器根目录，默认为当前目录
    #[arg(short = 'c', long = "root")]
    root: Option<PathBuf>,

    #[arg(short = 'd', long = "daemon", value_enum)]
    daemon: Option<DaemonCommand>,

    /// 不把 `/` 重定向到首页文件
    #[arg(short = 'a', long)]
    disable_redirect: bool,

    /// 缓存文件存在时直接使用，不再回读源文件
    #[arg(short = 'n', long)]
    disable_cache: bool,

    /// 不使用 public 目录下的自定义错误页
    #[arg(short = 'e', long)]
    disable_error_pages: bool,
}

fn main() {
    let cli = Cli::parse();
    if let Err(message) = run(cli) {
        eprintln!("{}", message);
        error!("{}", message);
        process::exit(1);
    }
}

fn run(cli: Cli) -> Result<(), String> {
    let root = enter_root(cli.root.as_deref())?;

    if cli.daemon == Some(DaemonCommand::Stop) {
        return daemon::run(DaemonCommand::Stop).map_err(|e| e.to_string());
    }

    let port = cli
        .port
        .ok_or_else(|| "必须通过 -p 指定监听端口".to_string())?;

    if let Some(command) = cli.daemon {
        daemon::run(command).map_err(|e| e.to_string())?;
    }

    init_logging(&root);
    install_panic_hook();
    info!("{} 启动，根目录：{}", server_header(), root.display());

    let tunables = Tunables::from_root(&root);
    let config = ServerConfig::new(port, root)
        .with_whitelist(cli.whitelist, cli.mask)
        .with_cache_disabled(cli.disable_cache)
        .with_redirect_disabled(cli.disable_redirect)
        .with_error_pages_disabled(cli.disable_error_pages)
        .with_tunables(tunables);

    match probe_php(config.tunables().php_binary()) {
        Some(version) => info!("找到PHP解释器，版本：{}", version),
        None => warn!("无法找到PHP解释器。服务器将继续运行，但将无法处理PHP请求。"),
    }

    let scripts = ScriptTable::load_dir(&config.scripts_dir(), &TemplateEngine)
        .map_err(|e| format!("加载脚本失败：{}", e))?;
    info!("共加载{}个脚本", scripts.len());

    let worker_threads = config.tunables().worker_threads();
    let runtime = Builder::new_multi_thread()
        .worker_threads(worker_threads)
        .enable_all()
        .build()
        .map_err(|e| format!("无法创建运行时：{}", e))?;
    info!("运行时已创建，工作线程数：{}", worker_threads);

    let pipeline = Arc::new(Pipeline::new(Arc::new(config), Arc::new(scripts)));
    runtime.block_on(async move {
        let socket = SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, port);
        let listener = TcpListener::bind(socket)
            .await
            .map_err(|e| format!("无法绑定端口：{}，错误：{}", port, e))?;
        info!("端口{}绑定完成", port);
        server::serve(listener, pipeline).await;
        Ok::<(), String>(())
    })
}

/// 切换工作目录到服务器根目录，返回其绝对路径
fn enter_root(root: Option<&Path>) -> Result<PathBuf, String> {
    let root = match root {
        Some(root) => root.to_path_buf(),
        None => env::current_dir().map_err(|e| format!("无法获取当前目录：{}", e))?,
    };
    let root = root
        .canonicalize()
        .map_err(|e| format!("无法打开根目录{}：{}", root.display(), e))?;
    env::set_current_dir(&root).map_err(|e| format!("无法进入根目录{}：{}", root.display(), e))?;
    Ok(root)
}

fn init_logging(root: &Path) {
    let file = root.join(CONFIG_DIR).join(LOG_CONFIG_FILE);
    if file.is_file() {
        match log4rs::init_file(&file, Default::default()) {
            Ok(()) => return,
            Err(e) => eprintln!("无法加载日志配置{}：{}，使用默认配置", file.display(), e),
        }
    }

    let stdout = ConsoleAppender::builder()
        .encoder(Box::new(PatternEncoder::new(LOG_PATTERN)))
        .build();
    let stderr = ConsoleAppender::builder()
        .target(Target::Stderr)
        .encoder(Box::new(PatternEncoder::new(LOG_PATTERN)))
        .build();
    let config = Config::builder()
        .appender(Appender::builder().build("stdout", Box::new(stdout)))
        .appender(
            Appender::builder()
                .filter(Box::new(ThresholdFilter::new(LevelFilter::Warn)))
                .build("stderr", Box::new(stderr)),
        )
        .build(
            Root::builder()
                .appender("stdout")
                .appender("stderr")
                .build(LevelFilter::Info),
        );
    match config {
        Ok(config) => {
            if let Err(e) = log4rs::init_config(config) {
                eprintln!("无法初始化日志系统：{}", e);
            }
        }
        Err(e) => eprintln!("日志配置无效：{}", e),
    }
}

/// 任何线程 panic 都记录时间与位置后直接退出进程
fn install_panic_hook() {
    std::panic::set_hook(Box::new(|panic_info| {
        let now = chrono::Local::now().format("%Y-%m-%d %H:%M:%S");
        error!("[{}] Tiger 崩溃：{}", now, panic_info);
        eprintln!(
            "[{}] Tiger crashed: {}\nPlease report this along with the contents of err.log.",
            now, panic_info
        );
        process::exit(1);
    }));
}
