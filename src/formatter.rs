use crate::error::{LogError, Result};
use crate::level::LogLevel;
use crate::record::{LogContext, LogRecord};
use crate::template::{parse_template, Placeholder};
use chrono::format::{Item, StrftimeItems};
use chrono::Local;
use serde::Deserialize;
use smart_default::SmartDefault;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use sysinfo::{Pid, ProcessesToUpdate, System};

/// TemplateFormatter 配置
#[derive(Debug, Clone, Deserialize, SmartDefault)]
#[serde(default)]
pub struct TemplateFormatterConfig {
    /// 应用名称，`%n` 的取值
    #[default("app".to_string())]
    pub app_name: String,

    /// 模板：有序的占位符代码列表，构造时整体校验
    #[default(vec![
        "%n".to_string(),
        "%T".to_string(),
        "%L".to_string(),
        "%R".to_string(),
        "%m".to_string(),
        "%I".to_string(),
        "%Q".to_string(),
        "%F".to_string(),
        "%U".to_string(),
        "%M".to_string(),
    ])]
    pub template: Vec<String>,

    /// 秒级时间格式（strftime），构造时校验
    #[default("%Y-%m-%d %H:%M:%S".to_string())]
    pub datetime_format: String,

    /// `%T` 的小数位数，仅支持 3 或 6，其他值按 3 处理
    #[default = 3]
    pub micro_digits: u8,

    /// 字段分隔符，`%M` 中出现的分隔符会被替换为空格
    #[default(" | ".to_string())]
    pub split: String,

    /// 根路径前缀，`%R` 与 `%F` 输出时去除
    #[default(None)]
    pub root_path: Option<String>,

    /// `%F` 是否只保留文件名
    #[default = false]
    pub use_basename: bool,
}

/// 内存采样器
///
/// 只有模板包含 `%U`/`%u` 时才会创建；峰值是本采样器观测到的高水位。
#[derive(Debug)]
struct MemSampler {
    sys: Mutex<System>,
    pid: Pid,
    peak: AtomicU64,
}

impl MemSampler {
    fn new() -> Self {
        Self {
            sys: Mutex::new(System::new()),
            pid: Pid::from_u32(std::process::id()),
            peak: AtomicU64::new(0),
        }
    }

    /// 当前进程内存占用（字节）
    fn current(&self) -> u64 {
        let mut sys = self.sys.lock().unwrap();
        sys.refresh_processes(ProcessesToUpdate::Some(&[self.pid]), true);
        let current = sys.process(self.pid).map(|p| p.memory()).unwrap_or(0);
        self.peak.fetch_max(current, Ordering::Relaxed);
        current
    }

    /// 观测到的内存占用峰值（字节）
    fn peak(&self) -> u64 {
        let current = self.current();
        self.peak.load(Ordering::Relaxed).max(current)
    }
}

/// 模板格式化器
///
/// 将一次日志调用渲染为一条有序字段记录，每个配置的占位符对应一个字段。
/// 除时钟、进程、主机、内存、调用位置这些环境来源的字段外，对输入是纯函数。
#[derive(Debug)]
pub struct TemplateFormatter {
    config: TemplateFormatterConfig,
    template: Vec<Placeholder>,
    pid: u32,
    mem: Option<MemSampler>,
}

/// 校验 strftime 格式串，非法的格式指示符在构造阶段就报错
fn validate_datetime_format(format: &str) -> Result<()> {
    if StrftimeItems::new(format).any(|item| matches!(item, Item::Error)) {
        return Err(LogError::Configuration(format!(
            "非法的时间格式: {}",
            format
        )));
    }
    Ok(())
}

impl TemplateFormatter {
    /// 从配置创建格式化器
    ///
    /// 未知占位符、空分隔符、非法时间格式都会在这里立即失败
    pub fn new(config: TemplateFormatterConfig) -> Result<Self> {
        let mut config = config;
        if config.split.is_empty() {
            return Err(LogError::Configuration("split 不能为空".to_string()));
        }
        validate_datetime_format(&config.datetime_format)?;
        if config.micro_digits != 3 && config.micro_digits != 6 {
            config.micro_digits = 3;
        }

        let template = parse_template(&config.template)?;
        let mem = template
            .iter()
            .any(|ph| matches!(ph, Placeholder::MemUsage | Placeholder::MemPeak))
            .then(MemSampler::new);

        Ok(Self {
            config,
            template,
            pid: std::process::id(),
            mem,
        })
    }

    /// 渲染一条记录
    pub fn render(&self, level: LogLevel, message: &str, context: &LogContext) -> LogRecord {
        let fields = self
            .template
            .iter()
            .map(|ph| self.eval(*ph, level, message, context))
            .collect();

        let mut record = LogRecord::from_fields(fields);
        record.module = context.module.clone();
        record.color = context.color.clone();
        record.vars = context.vars.clone();
        record
    }

    /// 计算单个占位符的取值
    fn eval(
        &self,
        placeholder: Placeholder,
        level: LogLevel,
        message: &str,
        context: &LogContext,
    ) -> String {
        match placeholder {
            Placeholder::AppName => self.config.app_name.clone(),

            Placeholder::Level => level.to_string(),

            Placeholder::Message => {
                // 消息里出现分隔符会破坏行结构，先替换为空格再做上下文替换
                let mut message = message.replace(&self.config.split, " ");
                for (key, value) in &context.values {
                    message = message.replace(key.as_str(), value);
                }
                message
            }

            Placeholder::Timestamp => {
                let now = Local::now();
                let fraction = if self.config.micro_digits == 6 {
                    format!("{:06}", now.timestamp_subsec_micros())
                } else {
                    format!("{:03}", now.timestamp_subsec_millis())
                };
                format!(
                    "{}.{}",
                    now.format(&self.config.datetime_format),
                    fraction
                )
            }

            Placeholder::TimestampSec => Local::now()
                .format(&self.config.datetime_format)
                .to_string(),

            Placeholder::RequestId => context
                .vars
                .get(&Placeholder::RequestId)
                .cloned()
                .unwrap_or_else(|| uuid::Uuid::new_v4().simple().to_string()),

            Placeholder::Host => context
                .vars
                .get(&Placeholder::Host)
                .cloned()
                .unwrap_or_else(|| {
                    std::env::var("HOSTNAME").unwrap_or_else(|_| "local".to_string())
                }),

            Placeholder::Pid => context
                .vars
                .get(&Placeholder::Pid)
                .cloned()
                .unwrap_or_else(|| self.pid.to_string()),

            Placeholder::Transport => context
                .vars
                .get(&Placeholder::Transport)
                .cloned()
                .unwrap_or_else(|| "cli".to_string()),

            Placeholder::Route => {
                let route = context
                    .vars
                    .get(&Placeholder::Route)
                    .cloned()
                    .unwrap_or_else(|| "/".to_string());
                self.strip_root(route)
            }

            Placeholder::Method => context
                .vars
                .get(&Placeholder::Method)
                .cloned()
                .unwrap_or_else(|| std::env::var("SHELL").unwrap_or_else(|_| "shell".to_string()))
                .to_lowercase(),

            Placeholder::LocalIp => context
                .vars
                .get(&Placeholder::LocalIp)
                .cloned()
                .unwrap_or_else(|| {
                    local_ip_address::local_ip()
                        .map(|ip| ip.to_string())
                        .unwrap_or_else(|_| "127.0.0.1".to_string())
                }),

            Placeholder::CallerFile => {
                let (file, line) = match &context.caller {
                    Some(caller) => (caller.file.clone(), caller.line),
                    // 没有捕获到调用点时的显式兜底
                    None => ("unknown".to_string(), 0),
                };
                let file = if self.config.use_basename {
                    Path::new(&file)
                        .file_name()
                        .and_then(|name| name.to_str())
                        .map(|name| name.to_string())
                        .unwrap_or(file)
                } else {
                    self.strip_root(file)
                };
                format!("pid:{}@{}:{}", self.pid, file, line)
            }

            Placeholder::CallerModule => {
                let module = context
                    .caller
                    .as_ref()
                    .map(|caller| caller.module.clone())
                    .unwrap_or_else(|| "unknown".to_string());
                format!("pid:{}@{}", self.pid, module)
            }

            Placeholder::MemUsage => self
                .mem
                .as_ref()
                .map(|mem| mem.current())
                .unwrap_or(0)
                .to_string(),

            Placeholder::MemPeak => self
                .mem
                .as_ref()
                .map(|mem| mem.peak())
                .unwrap_or(0)
                .to_string(),
        }
    }

    /// 去除配置的根路径前缀
    fn strip_root(&self, value: String) -> String {
        match &self.config.root_path {
            Some(root) => value
                .strip_prefix(&format!("{}/", root))
                .map(|stripped| stripped.to_string())
                .unwrap_or(value),
            None => value,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::CallSite;
    use crate::record::RecordBody;

    fn formatter_with_template(codes: &[&str]) -> TemplateFormatter {
        let config = TemplateFormatterConfig {
            template: codes.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        };
        TemplateFormatter::new(config).unwrap()
    }

    fn fields(record: &LogRecord) -> Vec<String> {
        match &record.body {
            RecordBody::Fields(fields) => fields.clone(),
            _ => panic!("expected fields body"),
        }
    }

    #[test]
    fn test_config_default() {
        let config = TemplateFormatterConfig::default();
        assert_eq!(config.app_name, "app");
        assert_eq!(config.template.len(), 10);
        assert_eq!(config.split, " | ");
        assert_eq!(config.micro_digits, 3);
        assert_eq!(config.datetime_format, "%Y-%m-%d %H:%M:%S");
        assert!(config.root_path.is_none());
        assert!(!config.use_basename);
    }

    #[test]
    fn test_render_level_and_message() {
        let formatter = formatter_with_template(&["%L", "%M"]);
        let record = formatter.render(LogLevel::Info, "hello", &LogContext::new());
        assert_eq!(fields(&record), vec!["INFO", "hello"]);
    }

    #[test]
    fn test_render_message_substitution() {
        let formatter = formatter_with_template(&["%M"]);
        let context = LogContext::new().with_value("{user}", "alice");
        let record = formatter.render(LogLevel::Info, "user {user} logged in", &context);
        assert_eq!(fields(&record), vec!["user alice logged in"]);
    }

    #[test]
    fn test_render_message_strips_split() {
        let formatter = formatter_with_template(&["%M"]);
        let record = formatter.render(LogLevel::Info, "a | b | c", &LogContext::new());
        // 分隔符被替换为空格，消息不会撑破行结构
        assert_eq!(fields(&record), vec!["a b c"]);
    }

    #[test]
    fn test_render_app_name_and_pid() {
        let config = TemplateFormatterConfig {
            app_name: "demo".to_string(),
            template: vec!["%n".to_string(), "%P".to_string()],
            ..Default::default()
        };
        let formatter = TemplateFormatter::new(config).unwrap();
        let record = formatter.render(LogLevel::Debug, "x", &LogContext::new());
        let fields = fields(&record);
        assert_eq!(fields[0], "demo");
        assert_eq!(fields[1], std::process::id().to_string());
    }

    #[test]
    fn test_render_timestamp_fraction_width() {
        let formatter = formatter_with_template(&["%T"]);
        let record = formatter.render(LogLevel::Info, "x", &LogContext::new());
        let value = fields(&record).remove(0);
        let fraction = value.rsplit('.').next().unwrap();
        assert_eq!(fraction.len(), 3);
        assert!(fraction.chars().all(|c| c.is_ascii_digit()));
    }

    #[test]
    fn test_render_timestamp_micro_digits() {
        let config = TemplateFormatterConfig {
            template: vec!["%T".to_string()],
            micro_digits: 6,
            ..Default::default()
        };
        let formatter = TemplateFormatter::new(config).unwrap();
        let record = formatter.render(LogLevel::Info, "x", &LogContext::new());
        let value = fields(&record).remove(0);
        assert_eq!(value.rsplit('.').next().unwrap().len(), 6);
    }

    #[test]
    fn test_micro_digits_coerced() {
        // 3/6 之外的值按 3 处理，不报错
        let config = TemplateFormatterConfig {
            template: vec!["%T".to_string()],
            micro_digits: 4,
            ..Default::default()
        };
        let formatter = TemplateFormatter::new(config).unwrap();
        let record = formatter.render(LogLevel::Info, "x", &LogContext::new());
        let value = fields(&record).remove(0);
        assert_eq!(value.rsplit('.').next().unwrap().len(), 3);
    }

    #[test]
    fn test_request_id_fallback_and_override() {
        let formatter = formatter_with_template(&["%Q"]);

        let generated = fields(&formatter.render(LogLevel::Info, "x", &LogContext::new()));
        assert!(!generated[0].is_empty());

        let context = LogContext::new().with_var(Placeholder::RequestId, "req-42");
        let explicit = fields(&formatter.render(LogLevel::Info, "x", &context));
        assert_eq!(explicit[0], "req-42");
    }

    #[test]
    fn test_request_vars_carried_on_record() {
        let formatter = formatter_with_template(&["%L"]);
        let context = LogContext::new()
            .with_var(Placeholder::Method, "GET")
            .with_var(Placeholder::Route, "/api/users")
            .with_color("green");
        let record = formatter.render(LogLevel::Info, "x", &context);
        assert_eq!(
            record.vars.get(&Placeholder::Method).map(|s| s.as_str()),
            Some("GET")
        );
        assert_eq!(record.color.as_deref(), Some("green"));
    }

    #[test]
    fn test_route_root_stripped() {
        let config = TemplateFormatterConfig {
            template: vec!["%R".to_string()],
            root_path: Some("/srv/app".to_string()),
            ..Default::default()
        };
        let formatter = TemplateFormatter::new(config).unwrap();
        let context = LogContext::new().with_var(Placeholder::Route, "/srv/app/api/users");
        let record = formatter.render(LogLevel::Info, "x", &context);
        assert_eq!(fields(&record), vec!["api/users"]);
    }

    #[test]
    fn test_method_lowercased() {
        let formatter = formatter_with_template(&["%m"]);
        let context = LogContext::new().with_var(Placeholder::Method, "POST");
        let record = formatter.render(LogLevel::Info, "x", &context);
        assert_eq!(fields(&record), vec!["post"]);
    }

    #[test]
    fn test_caller_file_with_basename() {
        let config = TemplateFormatterConfig {
            template: vec!["%F".to_string()],
            use_basename: true,
            ..Default::default()
        };
        let formatter = TemplateFormatter::new(config).unwrap();
        let context =
            LogContext::new().with_caller(CallSite::new("src/server/handler.rs", 17, "m"));
        let record = formatter.render(LogLevel::Info, "x", &context);
        let value = fields(&record).remove(0);
        assert_eq!(value, format!("pid:{}@handler.rs:17", std::process::id()));
    }

    #[test]
    fn test_caller_file_fallback() {
        let formatter = formatter_with_template(&["%F"]);
        let record = formatter.render(LogLevel::Info, "x", &LogContext::new());
        let value = fields(&record).remove(0);
        assert!(value.ends_with("@unknown:0"));
    }

    #[test]
    fn test_caller_module() {
        let formatter = formatter_with_template(&["%C"]);
        let context = LogContext::new().with_caller(CallSite::new("f.rs", 1, "app::handler"));
        let record = formatter.render(LogLevel::Info, "x", &context);
        let value = fields(&record).remove(0);
        assert_eq!(value, format!("pid:{}@app::handler", std::process::id()));
    }

    #[test]
    fn test_mem_usage_rendered() {
        let formatter = formatter_with_template(&["%U", "%u"]);
        let record = formatter.render(LogLevel::Info, "x", &LogContext::new());
        let fields = fields(&record);
        let current: u64 = fields[0].parse().unwrap();
        let peak: u64 = fields[1].parse().unwrap();
        assert!(peak >= current || current == 0);
    }

    #[test]
    fn test_unknown_placeholder_fails_construction() {
        let config = TemplateFormatterConfig {
            template: vec!["%L".to_string(), "%x".to_string()],
            ..Default::default()
        };
        let err = TemplateFormatter::new(config).unwrap_err();
        assert!(matches!(err, LogError::UnsupportedPlaceholder { .. }));
    }

    #[test]
    fn test_invalid_datetime_format_fails_construction() {
        let config = TemplateFormatterConfig {
            datetime_format: "%Y-%E".to_string(),
            ..Default::default()
        };
        assert!(TemplateFormatter::new(config).is_err());
    }

    #[test]
    fn test_empty_split_fails_construction() {
        let config = TemplateFormatterConfig {
            split: String::new(),
            ..Default::default()
        };
        assert!(TemplateFormatter::new(config).is_err());
    }

    #[test]
    fn test_config_from_json5() {
        let config: TemplateFormatterConfig = json5::from_str(
            r#"
            {
                app_name: "gateway",
                template: ["%L", "%T", "%M"],
                micro_digits: 6,
            }
            "#,
        )
        .unwrap();
        assert_eq!(config.app_name, "gateway");
        assert_eq!(config.template.len(), 3);
        assert_eq!(config.micro_digits, 6);
        // 未指定的字段落默认值
        assert_eq!(config.split, " | ");
    }
}
