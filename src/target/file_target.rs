use crate::error::{LogError, Result};
use crate::record::LogRecord;
use crate::target::{LineFilter, LogTarget};
use serde::Deserialize;
use smart_default::SmartDefault;
use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, oneshot};

/// FileTarget 配置
#[derive(Debug, Clone, Deserialize, SmartDefault)]
#[serde(default)]
pub struct FileTargetConfig {
    // ========== 基本信息 ==========
    /// 日志文件基础路径，模块名缺省时的落盘文件
    #[default("logs/app.log".to_string())]
    pub base_path: String,

    /// 字段分隔符
    #[default(" | ".to_string())]
    pub split: String,

    // ========== 级别过滤 ==========
    /// 级别白名单（大小写不敏感），为空表示不过滤
    pub level_filter: Vec<String>,

    /// 级别字段在行内的位置
    #[default = 1]
    pub level_index: usize,

    // ========== 切分策略 ==========
    /// 是否启用按大小切分
    #[default = true]
    pub enable_rotation: bool,

    /// 单个文件最大大小（KB），下限 1
    #[default = 10240]
    pub max_file_size_kb: u64,

    /// 保留的切分代数，下限 1
    #[default = 5]
    pub max_log_files: usize,

    // ========== 权限 ==========
    /// 日志文件权限（可选）
    #[default(None)]
    pub file_mode: Option<u32>,

    /// 目录权限
    #[default(0o775)]
    pub dir_mode: u32,
}

/// 写入循环消息
enum WriterMsg {
    /// 一条待写入的行
    Entry { file: PathBuf, line: String },
    /// 强制排空；携带回执时等待方会被唤醒
    Flush(Option<oneshot::Sender<()>>),
    /// 停止写入循环并释放句柄
    Shutdown(oneshot::Sender<()>),
}

/// 文件输出目标
///
/// 生产者侧只做归一化和入队；唯一的写入循环任务负责按落盘文件分组、
/// 切分超限文件并在建议性排他锁内批量追加。队列不限长，消费端阻塞时
/// 不对生产者施加背压。
///
/// 构造时会启动写入循环任务，必须在 tokio 运行时内创建。
pub struct FileTarget {
    config: FileTargetConfig,
    log_file: PathBuf,
    filter: LineFilter,
    /// 句柄注册表：按解析后的路径缓存，单实例独占，close 时统一释放
    handles: Arc<Mutex<HashMap<PathBuf, File>>>,
    tx: mpsc::UnboundedSender<WriterMsg>,
    closed: AtomicBool,
}

impl FileTarget {
    /// 从配置创建 FileTarget
    pub fn new(config: FileTargetConfig) -> Result<Self> {
        let mut config = config;
        if config.split.is_empty() {
            return Err(LogError::Configuration("split 不能为空".to_string()));
        }
        // 非法阈值按下限处理，不报错
        if config.max_file_size_kb < 1 {
            config.max_file_size_kb = 1;
        }
        if config.max_log_files < 1 {
            config.max_log_files = 1;
        }

        let log_file = PathBuf::from(&config.base_path);
        let filter = LineFilter::new(&config.split, &config.level_filter, config.level_index);
        let handles = Arc::new(Mutex::new(HashMap::new()));

        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(writer_loop(rx, Arc::clone(&handles), config.clone()));

        Ok(Self {
            config,
            log_file,
            filter,
            handles,
            tx,
            closed: AtomicBool::new(false),
        })
    }

    /// 懒打开并缓存落盘文件句柄
    ///
    /// 打开失败属于配置问题而不是瞬时 IO 故障，错误直接返回给 export 调用方
    fn ensure_handle(&self, path: &Path) -> Result<()> {
        let mut pool = self.handles.lock().unwrap();
        if pool.contains_key(path) {
            return Ok(());
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|source| LogError::DestinationOpen {
                path: path.display().to_string(),
                source,
            })?;
        pool.insert(path.to_path_buf(), file);
        Ok(())
    }
}

#[async_trait::async_trait]
impl LogTarget for FileTarget {
    async fn init(&self) -> Result<()> {
        if let Some(dir) = self.log_file.parent() {
            if !dir.as_os_str().is_empty() {
                create_log_dir(dir, self.config.dir_mode).map_err(|source| {
                    LogError::DestinationOpen {
                        path: dir.display().to_string(),
                        source,
                    }
                })?;
            }
        }
        Ok(())
    }

    async fn export(&self, records: &[LogRecord], flush: bool) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(LogError::TargetClosed);
        }
        for record in records {
            let file = resolve_destination(&self.log_file, record.module.as_deref());
            self.ensure_handle(&file)?;
            let Some(line) = self.filter.normalize(record) else {
                continue;
            };
            if self.tx.send(WriterMsg::Entry { file, line }).is_err() {
                return Err(LogError::TargetClosed);
            }
        }
        if flush {
            let _ = self.tx.send(WriterMsg::Flush(None));
        }
        Ok(())
    }

    async fn flush(&self) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(LogError::TargetClosed);
        }
        let (ack, done) = oneshot::channel();
        self.tx
            .send(WriterMsg::Flush(Some(ack)))
            .map_err(|_| LogError::TargetClosed)?;
        done.await.map_err(|_| LogError::TargetClosed)?;
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        // 重复 close 无副作用
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let (ack, done) = oneshot::channel();
        if self.tx.send(WriterMsg::Shutdown(ack)).is_ok() {
            let _ = done.await;
        }
        Ok(())
    }
}

/// 解析落盘文件路径
///
/// 模块名自带扩展名时就是完整路径；否则落到基础路径所在目录，
/// 沿用基础路径的扩展名。相同输入总是解析出相同路径。
fn resolve_destination(base: &Path, module: Option<&str>) -> PathBuf {
    let Some(module) = module else {
        return base.to_path_buf();
    };
    let path = Path::new(module);
    if path.extension().is_some() {
        return path.to_path_buf();
    }
    let dir = base
        .parent()
        .filter(|dir| !dir.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let ext = base.extension().and_then(|ext| ext.to_str()).unwrap_or("log");
    dir.join(format!("{}.{}", module, ext))
}

/// 第 i 代切分文件路径，第 0 代就是活动文件
fn generation_path(file: &Path, generation: usize) -> PathBuf {
    if generation == 0 {
        return file.to_path_buf();
    }
    let stem = file
        .file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or("app");
    let ext = file.extension().and_then(|ext| ext.to_str()).unwrap_or("log");
    file.with_file_name(format!("{}-f{}.{}", stem, generation, ext))
}

/// 单消费者写入循环
///
/// 每个唤醒周期把队列里积压的全部消息取空，按落盘文件分组后在阻塞
/// 线程上完成 chmod、切分检查和加锁写入。运行期 IO 错误一律抑制并
/// 输出诊断，循环继续处理下一组。
async fn writer_loop(
    mut rx: mpsc::UnboundedReceiver<WriterMsg>,
    handles: Arc<Mutex<HashMap<PathBuf, File>>>,
    config: FileTargetConfig,
) {
    let mut shutdown_acks: Vec<oneshot::Sender<()>> = Vec::new();
    while shutdown_acks.is_empty() {
        let Some(first) = rx.recv().await else {
            break;
        };
        let mut pending = vec![first];
        while let Ok(msg) = rx.try_recv() {
            pending.push(msg);
        }

        // 按落盘文件分组，组内保持入队顺序
        let mut groups: HashMap<PathBuf, Vec<String>> = HashMap::new();
        let mut flush_acks: Vec<oneshot::Sender<()>> = Vec::new();
        let mut sync_requested = false;
        for msg in pending {
            match msg {
                WriterMsg::Entry { file, line } => groups.entry(file).or_default().push(line),
                WriterMsg::Flush(ack) => {
                    sync_requested = true;
                    if let Some(ack) = ack {
                        flush_acks.push(ack);
                    }
                }
                WriterMsg::Shutdown(ack) => shutdown_acks.push(ack),
            }
        }

        if !groups.is_empty() {
            let handles = Arc::clone(&handles);
            let config = config.clone();
            let _ = tokio::task::spawn_blocking(move || write_groups(&handles, &config, groups))
                .await;
        }
        if sync_requested || !shutdown_acks.is_empty() {
            let handles = Arc::clone(&handles);
            let _ = tokio::task::spawn_blocking(move || sync_handles(&handles)).await;
        }
        for ack in flush_acks {
            let _ = ack.send(());
        }
    }

    // 句柄只在这里释放，每个打开的句柄恰好关闭一次
    handles.lock().unwrap().clear();
    for ack in shutdown_acks {
        let _ = ack.send(());
    }
}

/// 一个排空周期的落盘阶段
fn write_groups(
    handles: &Mutex<HashMap<PathBuf, File>>,
    config: &FileTargetConfig,
    groups: HashMap<PathBuf, Vec<String>>,
) {
    for (file, lines) in groups {
        if let Some(mode) = config.file_mode {
            apply_file_mode(&file, mode);
        }
        if config.enable_rotation {
            // 每个周期重新读取文件大小，不依赖缓存值
            match fs::metadata(&file) {
                Ok(meta) if meta.len() > config.max_file_size_kb * 1024 => {
                    rotate_files(&file, config);
                }
                Ok(_) => {}
                Err(err) => report_io("stat", &file, &err),
            }
        }

        let pool = handles.lock().unwrap();
        let Some(handle) = pool.get(&file) else {
            continue;
        };
        if let Err(err) = handle.lock() {
            report_io("lock", &file, &err);
        }
        let mut payload = lines.join("\n");
        payload.push('\n');
        let mut writer = handle;
        if let Err(err) = writer.write_all(payload.as_bytes()) {
            report_io("write", &file, &err);
        }
        if let Err(err) = handle.unlock() {
            report_io("unlock", &file, &err);
        }
    }
}

/// 切分超限文件
///
/// 从最老的一代往回处理：第 N 代直接删除，其余各代拷贝（而非改名）到
/// 下一代，活动文件最后在锁内原地截断。拷贝保证本进程和其他进程已经
/// 打开的句柄在切分后仍然有效。
fn rotate_files(file: &Path, config: &FileTargetConfig) {
    for generation in (0..=config.max_log_files).rev() {
        let rotate_file = generation_path(file, generation);
        if !rotate_file.exists() {
            continue;
        }
        if generation == config.max_log_files {
            // 最老的一代丢弃
            if let Err(err) = fs::remove_file(&rotate_file) {
                report_io("remove", &rotate_file, &err);
            }
            continue;
        }
        let new_file = generation_path(file, generation + 1);
        if let Err(err) = fs::copy(&rotate_file, &new_file) {
            report_io("copy", &rotate_file, &err);
        }
        if let Some(mode) = config.file_mode {
            apply_file_mode(&new_file, mode);
        }
        if generation == 0 {
            clear_log_file(&rotate_file);
        }
    }
}

/// 原地清空活动文件，不使已打开的句柄失效
fn clear_log_file(path: &Path) {
    match OpenOptions::new().append(true).open(path) {
        Ok(file) => {
            if let Err(err) = file.lock() {
                report_io("lock", path, &err);
            }
            if let Err(err) = file.set_len(0) {
                report_io("truncate", path, &err);
            }
            if let Err(err) = file.unlock() {
                report_io("unlock", path, &err);
            }
        }
        Err(err) => report_io("open", path, &err),
    }
}

/// 把所有缓存句柄的数据刷到磁盘，尽力而为
fn sync_handles(handles: &Mutex<HashMap<PathBuf, File>>) {
    let pool = handles.lock().unwrap();
    for (path, file) in pool.iter() {
        if let Err(err) = file.sync_all() {
            report_io("sync", path, &err);
        }
    }
}

#[cfg(unix)]
fn apply_file_mode(path: &Path, mode: u32) {
    use std::os::unix::fs::PermissionsExt;
    if let Err(err) = fs::set_permissions(path, fs::Permissions::from_mode(mode)) {
        report_io("chmod", path, &err);
    }
}

#[cfg(not(unix))]
fn apply_file_mode(_path: &Path, _mode: u32) {}

#[cfg(unix)]
fn create_log_dir(dir: &Path, mode: u32) -> std::io::Result<()> {
    use std::os::unix::fs::DirBuilderExt;
    fs::DirBuilder::new().recursive(true).mode(mode).create(dir)
}

#[cfg(not(unix))]
fn create_log_dir(dir: &Path, _mode: u32) -> std::io::Result<()> {
    fs::create_dir_all(dir)
}

/// 写入循环内部的诊断输出，错误不向日志调用方传播
fn report_io(op: &str, path: &Path, err: &std::io::Error) {
    eprintln!("logx: {} 失败 [{}]: {}", op, path.display(), err);
}
