use crate::error::Result;
use crate::formatter::{TemplateFormatter, TemplateFormatterConfig};
use crate::level::LogLevel;
use crate::record::{LogContext, LogRecord};
use crate::target::LogTarget;
use serde::Deserialize;
use smart_default::SmartDefault;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

/// Logger 配置
#[derive(Debug, Clone, Deserialize, SmartDefault)]
#[serde(default)]
pub struct LoggerConfig {
    /// 格式化器配置
    pub formatter: TemplateFormatterConfig,

    /// 攒够多少条记录触发一次投递，下限 1（1 表示每条立即投递）
    #[default = 1]
    pub buffer_threshold: usize,

    /// 周期性强制刷新的间隔（秒），0 表示关闭
    #[default = 0]
    pub tick_interval_seconds: u64,
}

/// 发给目标 actor 的消息
enum TargetMsg {
    /// 一批待投递的记录
    Export { records: Vec<LogRecord>, flush: bool },
    /// 等待目标排空
    Flush { ack: oneshot::Sender<()> },
    /// 停止 actor 并关闭目标
    Shutdown { ack: oneshot::Sender<()> },
}

/// 每个目标一个 actor
///
/// 投递经由无界 channel 串行化：日志调用方只付出一次入队的开销，
/// 不会因为某个目标变慢而被阻塞（代价是不对生产者施加背压）。
/// 投递过程中抛出的任何错误都在 actor 边界被捕获并转成诊断输出，
/// 不影响其他目标，也不会传回日志调用方。
struct TargetActor {
    tx: mpsc::UnboundedSender<TargetMsg>,
}

fn spawn_actor(target: Arc<dyn LogTarget>) -> TargetActor {
    let (tx, mut rx) = mpsc::unbounded_channel::<TargetMsg>();
    tokio::spawn(async move {
        // 延迟初始化在首次投递前恰好执行一次
        if let Err(err) = target.init().await {
            eprintln!("logx: 目标初始化失败: {}", err);
        }
        while let Some(msg) = rx.recv().await {
            match msg {
                TargetMsg::Export { records, flush } => {
                    if let Err(err) = target.export(&records, flush).await {
                        eprintln!("logx: 日志投递失败: {}", err);
                    }
                }
                TargetMsg::Flush { ack } => {
                    if let Err(err) = target.flush().await {
                        eprintln!("logx: 强制刷新失败: {}", err);
                    }
                    let _ = ack.send(());
                }
                TargetMsg::Shutdown { ack } => {
                    if let Err(err) = target.flush().await {
                        eprintln!("logx: 强制刷新失败: {}", err);
                    }
                    if let Err(err) = target.close().await {
                        eprintln!("logx: 目标关闭失败: {}", err);
                    }
                    let _ = ack.send(());
                    break;
                }
            }
        }
    });
    TargetActor { tx }
}

struct LoggerCore {
    formatter: TemplateFormatter,
    actors: Vec<TargetActor>,
    buffer: Mutex<Vec<LogRecord>>,
    buffer_threshold: usize,
}

impl LoggerCore {
    /// 把一批记录派发给所有目标
    fn dispatch(&self, records: Vec<LogRecord>, flush: bool) {
        for actor in &self.actors {
            let _ = actor.tx.send(TargetMsg::Export {
                records: records.clone(),
                flush,
            });
        }
    }

    /// 派发缓冲区中的记录；force 时额外等待每个目标排空
    async fn flush(&self, force: bool) {
        let records: Vec<LogRecord> = {
            let mut buffer = self.buffer.lock().unwrap();
            buffer.drain(..).collect()
        };
        if !records.is_empty() {
            self.dispatch(records, force);
        }
        if force {
            let mut pending = Vec::new();
            for actor in &self.actors {
                let (ack, done) = oneshot::channel();
                if actor.tx.send(TargetMsg::Flush { ack }).is_ok() {
                    pending.push(done);
                }
            }
            for done in pending {
                let _ = done.await;
            }
        }
    }
}

/// 核心日志器
///
/// 每次日志调用渲染一条记录，攒到阈值后派发给每个目标的 actor。
/// 同时是显式的生命周期对象：宿主在退出前调用一次 [`Logger::shutdown`]，
/// 完成最后一轮强制刷新并关闭全部目标——不做任何进程级的隐式注册。
pub struct Logger {
    core: Arc<LoggerCore>,
    tick: Mutex<Option<JoinHandle<()>>>,
    closed: AtomicBool,
}

impl Logger {
    /// 从配置和目标列表创建 Logger
    ///
    /// 配置错误（未知占位符、非法时间格式等）在这里立即失败；
    /// 需要在 tokio 运行时内创建。
    pub fn new(config: LoggerConfig, targets: Vec<Arc<dyn LogTarget>>) -> Result<Self> {
        let formatter = TemplateFormatter::new(config.formatter)?;
        let actors = targets.into_iter().map(spawn_actor).collect();

        let core = Arc::new(LoggerCore {
            formatter,
            actors,
            buffer: Mutex::new(Vec::new()),
            buffer_threshold: config.buffer_threshold.max(1),
        });

        let tick = if config.tick_interval_seconds > 0 {
            Some(spawn_tick(
                Arc::downgrade(&core),
                config.tick_interval_seconds,
            ))
        } else {
            None
        };

        Ok(Self {
            core,
            tick: Mutex::new(tick),
            closed: AtomicBool::new(false),
        })
    }

    /// 记录日志
    ///
    /// 渲染一条记录后立即返回，落盘由后台完成；任何投递失败都不会
    /// 传回调用方。shutdown 之后的调用被静默丢弃。
    pub fn log(&self, level: LogLevel, message: &str, context: LogContext) {
        if self.closed.load(Ordering::SeqCst) {
            return;
        }
        let record = self.core.formatter.render(level, message, &context);
        let batch = {
            let mut buffer = self.core.buffer.lock().unwrap();
            buffer.push(record);
            if buffer.len() >= self.core.buffer_threshold {
                Some(buffer.drain(..).collect::<Vec<_>>())
            } else {
                None
            }
        };
        if let Some(records) = batch {
            self.core.dispatch(records, false);
        }
    }

    /// 记录 TRACE 级别日志
    pub fn trace(&self, message: &str) {
        self.log(LogLevel::Trace, message, LogContext::new());
    }

    /// 记录 DEBUG 级别日志
    pub fn debug(&self, message: &str) {
        self.log(LogLevel::Debug, message, LogContext::new());
    }

    /// 记录 INFO 级别日志
    pub fn info(&self, message: &str) {
        self.log(LogLevel::Info, message, LogContext::new());
    }

    /// 记录 WARN 级别日志
    pub fn warn(&self, message: &str) {
        self.log(LogLevel::Warn, message, LogContext::new());
    }

    /// 记录 ERROR 级别日志
    pub fn error(&self, message: &str) {
        self.log(LogLevel::Error, message, LogContext::new());
    }

    /// 刷新缓冲区
    ///
    /// force 为 true 时等待每个目标确认排空完成
    pub async fn flush(&self, force: bool) {
        self.core.flush(force).await;
    }

    /// 关闭日志器
    ///
    /// 恰好生效一次：最后一轮强制刷新、停掉周期刷新、停止所有 actor
    /// 并关闭每个目标。重复调用无副作用。
    pub async fn shutdown(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.core.flush(true).await;

        let tick = self.tick.lock().unwrap().take();
        if let Some(tick) = tick {
            tick.abort();
        }

        let mut pending = Vec::new();
        for actor in &self.core.actors {
            let (ack, done) = oneshot::channel();
            if actor.tx.send(TargetMsg::Shutdown { ack }).is_ok() {
                pending.push(done);
            }
        }
        for done in pending {
            let _ = done.await;
        }
    }
}

/// 周期性强制刷新任务
///
/// 只持有弱引用：Logger 被丢弃后任务自行退出
fn spawn_tick(core: Weak<LoggerCore>, interval_seconds: u64) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(interval_seconds));
        // 第一个 tick 立即完成，跳过
        interval.tick().await;
        loop {
            interval.tick().await;
            let Some(core) = core.upgrade() else {
                break;
            };
            core.flush(true).await;
        }
    })
}
