/// CAS（Compare-And-Swap）操作最大重试次数
pub const MAX_CAS_RETRIES: u32 = 20;

/// 版本号快照读取的最大乐观重试次数，超过后改为持锁读取
pub const MAX_SNAPSHOT_RETRIES: u32 = 8;

/// 默认每日答题目标
pub const DEFAULT_DAILY_GOAL: u32 = 20;

/// IRT 区分度下限，低于此值视为退化参数
pub const MIN_DISCRIMINATION: f64 = 1e-3;

/// 标识符最大长度
pub const MAX_IDENTIFIER_LEN: usize = 128;

/// 单次读取异常事件的最大数量
pub const MAX_ANOMALY_PAGE: usize = 500;

/// 学生锁表超过此大小时清理空闲条目
pub const STUDENT_LOCK_PRUNE_THRESHOLD: usize = 1000;

/// 题目未提供 eloRating 时的初始难度评分
pub const DEFAULT_ITEM_RATING: f64 = 1200.0;
