use crate::template::Placeholder;
use std::collections::HashMap;

/// 记录主体
///
/// 正常路径下是格式化器产出的有序字段列表；外部格式化器（例如原生日志扩展的
/// 缓冲区）交来的则是按分隔符拼好的整行，由目标在入队前拆分、过滤、重组。
#[derive(Debug, Clone)]
pub enum RecordBody {
    /// 有序字段值，每个配置的占位符对应一个
    Fields(Vec<String>),
    /// 预拼接的整行
    Joined(String),
}

/// 一条格式化后的日志记录
///
/// 每次日志调用产生一条，被各目标消费一次后丢弃。
#[derive(Debug, Clone)]
pub struct LogRecord {
    /// 记录主体
    pub body: RecordBody,
    /// 模块名，覆盖文件目标的落盘文件
    pub module: Option<String>,
    /// 颜色标记，只参与终端渲染，不进入拼接文本
    pub color: Option<String>,
    /// 辅助映射：请求 ID、方法、路径、客户端地址等结构化值，
    /// 供非文件目标直接读取，避免重新拆行
    pub vars: HashMap<Placeholder, String>,
}

impl LogRecord {
    /// 从有序字段创建记录
    pub fn from_fields(fields: Vec<String>) -> Self {
        Self {
            body: RecordBody::Fields(fields),
            module: None,
            color: None,
            vars: HashMap::new(),
        }
    }

    /// 从预拼接的整行创建记录
    pub fn from_joined(line: impl Into<String>) -> Self {
        Self {
            body: RecordBody::Joined(line.into()),
            module: None,
            color: None,
            vars: HashMap::new(),
        }
    }

    /// 设置模块名
    pub fn with_module(mut self, module: impl Into<String>) -> Self {
        self.module = Some(module.into());
        self
    }

    /// 设置颜色标记
    pub fn with_color(mut self, color: impl Into<String>) -> Self {
        self.color = Some(color.into());
        self
    }

    /// 附加一个辅助值
    pub fn with_var(mut self, placeholder: Placeholder, value: impl Into<String>) -> Self {
        self.vars.insert(placeholder, value.into());
        self
    }
}

/// 调用位置
///
/// 由日志宏在调用点捕获；没有调用点信息时格式化器输出显式的兜底值。
#[derive(Debug, Clone)]
pub struct CallSite {
    /// 源文件路径
    pub file: String,
    /// 行号
    pub line: u32,
    /// 模块路径
    pub module: String,
}

impl CallSite {
    pub fn new(file: impl Into<String>, line: u32, module: impl Into<String>) -> Self {
        Self {
            file: file.into(),
            line,
            module: module.into(),
        }
    }
}

/// 单次日志调用携带的上下文
#[derive(Debug, Clone, Default)]
pub struct LogContext {
    /// 模块名，决定文件目标的落盘文件
    pub module: Option<String>,
    /// 消息替换表，按 key 替换进 `%M`
    pub values: Vec<(String, String)>,
    /// 请求级占位符取值（请求 ID、路径、方法、客户端地址等）
    pub vars: HashMap<Placeholder, String>,
    /// 颜色标记
    pub color: Option<String>,
    /// 调用位置
    pub caller: Option<CallSite>,
}

impl LogContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// 设置模块名
    pub fn with_module(mut self, module: impl Into<String>) -> Self {
        self.module = Some(module.into());
        self
    }

    /// 添加一个消息替换项
    pub fn with_value(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.values.push((key.into(), value.to_string()));
        self
    }

    /// 设置一个请求级占位符取值
    pub fn with_var(mut self, placeholder: Placeholder, value: impl Into<String>) -> Self {
        self.vars.insert(placeholder, value.into());
        self
    }

    /// 设置颜色标记
    pub fn with_color(mut self, color: impl Into<String>) -> Self {
        self.color = Some(color.into());
        self
    }

    /// 设置调用位置
    pub fn with_caller(mut self, caller: CallSite) -> Self {
        self.caller = Some(caller);
        self
    }
}
