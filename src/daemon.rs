//! 守护进程的启动、停止与重启。
//!
//! 运行目录固定为 `/run/tiger`，其中保存 `pid`、`info.log`、`err.log`。
//! 所有操作都发生在 tokio 运行时创建之前，此时进程仍是单线程的，可以安全地 fork。

use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};
use std::process;

use clap::ValueEnum;
use nix::sys::signal::{kill, signal, SigHandler, Signal};
use nix::sys::stat::{umask, Mode};
use nix::unistd::{dup2, fork, geteuid, getpid, setsid, ForkResult, Pid};

pub const RUNTIME_DIR: &str = "/run/tiger";

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum DaemonCommand {
    Start,
    Stop,
    Restart,
}

#[derive(Debug)]
pub enum DaemonError {
    NotRoot,
    NotStarted,
    InvalidPidFile(String),
    Io(io::Error),
    Sys(nix::Error),
}

impl fmt::Display for DaemonError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DaemonError::NotRoot => write!(f, "Daemon commands must be run as root"),
            DaemonError::NotStarted => write!(f, "Tiger hasn't yet started"),
            DaemonError::InvalidPidFile(s) => write!(f, "Invalid pidfile contents: {:?}", s),
            DaemonError::Io(e) => write!(f, "{}", e),
            DaemonError::Sys(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for DaemonError {}

impl From<io::Error> for DaemonError {
    fn from(e: io::Error) -> Self {
        DaemonError::Io(e)
    }
}

impl From<nix::Error> for DaemonError {
    fn from(e: nix::Error) -> Self {
        DaemonError::Sys(e)
    }
}

/// 执行守护进程指令。
///
/// `Start` 与 `Restart` 成功返回时，调用方已经是脱离终端的守护进程，应继续启动服务；
/// `Stop` 返回后调用方应直接退出。
pub fn run(command: DaemonCommand) -> Result<(), DaemonError> {
    if !geteuid().is_root() {
        return Err(DaemonError::NotRoot);
    }
    let dir = RuntimeDir::new(PathBuf::from(RUNTIME_DIR));
    match command {
        DaemonCommand::Start => dir.start(),
        DaemonCommand::Stop => dir.stop(false),
        DaemonCommand::Restart => {
            dir.stop(true)?;
            dir.start()
        }
    }
}

pub struct RuntimeDir {
    dir: PathBuf,
}

impl RuntimeDir {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    pub fn pid_path(&self) -> PathBuf {
        self.dir.join("pid")
    }

    pub fn info_log(&self) -> PathBuf {
        self.dir.join("info.log")
    }

    pub fn err_log(&self) -> PathBuf {
        self.dir.join("err.log")
    }

    /// 读取 pid 文件，文件不存在时返回 `None`
    pub fn read_pid(&self) -> Result<Option<i32>, DaemonError> {
        let text = match fs::read_to_string(self.pid_path()) {
            Ok(text) => text,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        text.trim()
            .parse::<i32>()
            .map(Some)
            .map_err(|_| DaemonError::InvalidPidFile(text.clone()))
    }

    pub fn write_pid(&self, pid: i32) -> Result<(), DaemonError> {
        let mut file = File::create(self.pid_path())?;
        writeln!(file, "{}", pid)?;
        Ok(())
    }

    /// 清空旧日志并重新打开，返回 (info, err)
    pub fn prepare_logs(&self) -> Result<(File, File), DaemonError> {
        fs::create_dir_all(&self.dir)?;
        let info = reopen(&self.info_log())?;
        let err = reopen(&self.err_log())?;
        Ok((info, err))
    }

    fn start(&self) -> Result<(), DaemonError> {
        println!("Started Daemon.");
        let (info, err) = self.prepare_logs()?;

        detach()?;
        setsid()?;
        // SAFETY: 运行时尚未创建，进程内只有一个线程
        unsafe {
            signal(Signal::SIGCHLD, SigHandler::SigIgn)?;
            signal(Signal::SIGHUP, SigHandler::SigIgn)?;
        }
        detach()?;
        umask(Mode::empty());

        self.write_pid(getpid().as_raw())?;
        dup2(info.as_raw_fd(), io::stdout().as_raw_fd())?;
        dup2(err.as_raw_fd(), io::stderr().as_raw_fd())?;
        Ok(())
    }

    fn stop(&self, tolerate_missing: bool) -> Result<(), DaemonError> {
        println!("Stopping Daemon...");
        let pid = match self.read_pid()? {
            Some(pid) => pid,
            None if tolerate_missing => return Ok(()),
            None => return Err(DaemonError::NotStarted),
        };
        println!("PID: {}", pid);
        kill(Pid::from_raw(pid), Signal::SIGTERM)?;
        fs::remove_file(self.pid_path())?;
        Ok(())
    }
}

fn reopen(path: &Path) -> io::Result<File> {
    match fs::remove_file(path) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => return Err(e),
    }
    OpenOptions::new().create(true).append(true).open(path)
}

/// fork 一次，父进程直接退出
fn detach() -> Result<(), DaemonError> {
    // SAFETY: 运行时尚未创建，进程内只有一个线程
    match unsafe { fork() }? {
        ForkResult::Parent { .. } => process::exit(0),
        ForkResult::Child => Ok(()),
    }
}
