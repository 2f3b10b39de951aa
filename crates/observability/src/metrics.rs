//! 运行指标收集模块
//!
//! 路由器在消息投递、实例启动和退出时调用这里的函数；
//! 运行结束后由 [`RunMetricsAggregator`] 汇总各实例的统计。

use std::time::Duration;

use contracts::{InstanceExit, InstanceId, InstanceStats};
use metrics::{counter, gauge, histogram};

/// 记录一条已路由的消息
pub fn record_message_routed(from: InstanceId, bytes: usize) {
    counter!("parunner_messages_total").increment(1);
    counter!("parunner_message_bytes_total").increment(bytes as u64);
    histogram!("parunner_message_size_bytes").record(bytes as f64);
    counter!("parunner_instance_messages_sent_total", "instance" => from.to_string())
        .increment(1);
}

/// 记录实例启动
pub fn record_instance_started() {
    counter!("parunner_instances_started_total").increment(1);
    gauge!("parunner_instances_running").increment(1.0);
}

/// 记录实例退出
pub fn record_instance_exit(exit: Option<&InstanceExit>) {
    let status = match exit {
        Some(exit) if exit.success() => "success",
        Some(InstanceExit::Signal(_)) => "signal",
        Some(InstanceExit::Code(_)) => "failure",
        None => "unknown",
    };
    counter!("parunner_instance_exits_total", "status" => status).increment(1);
    gauge!("parunner_instances_running").decrement(1.0);
}

/// 记录实例阻塞总时长
pub fn record_blocked_time(instance: InstanceId, blocked: Duration) {
    histogram!("parunner_instance_blocked_seconds", "instance" => instance.to_string())
        .record(blocked.as_secs_f64());
}

/// 记录一条遗留消息（实例退出时仍未被接收）
pub fn record_orphaned_messages(count: usize) {
    if count > 0 {
        counter!("parunner_orphaned_messages_total").increment(count as u64);
    }
}

/// 运行指标聚合器
///
/// 在内存中聚合各实例统计，便于输出摘要。
#[derive(Debug, Clone, Default)]
pub struct RunMetricsAggregator {
    /// 实例数
    pub instances: u64,

    /// 消息总数
    pub total_messages: u64,

    /// 字节总数
    pub total_bytes: u64,

    /// 非零退出的实例数
    pub failed_instances: u64,

    /// 阻塞时长统计 (毫秒)
    pub blocked_stats: RunningStats,

    /// 运行时长统计 (毫秒)
    pub running_stats: RunningStats,

    /// 每实例发送消息数统计
    pub sent_stats: RunningStats,
}

impl RunMetricsAggregator {
    /// 创建新的聚合器
    pub fn new() -> Self {
        Self::default()
    }

    /// 从一组实例统计构建
    pub fn from_stats<'a>(stats: impl IntoIterator<Item = &'a InstanceStats>) -> Self {
        let mut aggregator = Self::new();
        for instance in stats {
            aggregator.update(instance);
        }
        aggregator
    }

    /// 更新聚合统计
    pub fn update(&mut self, stats: &InstanceStats) {
        self.instances += 1;
        self.total_messages += stats.messages_sent;
        self.total_bytes += stats.bytes_sent;

        if stats.exit.as_ref().is_some_and(|exit| !exit.success()) {
            self.failed_instances += 1;
        }

        self.blocked_stats.push(stats.time_blocked.as_secs_f64() * 1000.0);
        self.running_stats.push(stats.time_running.as_secs_f64() * 1000.0);
        self.sent_stats.push(stats.messages_sent as f64);
    }

    /// 生成摘要报告
    pub fn summary(&self) -> MetricsSummary {
        MetricsSummary {
            instances: self.instances,
            total_messages: self.total_messages,
            total_bytes: self.total_bytes,
            failed_instances: self.failed_instances,
            mean_message_size: if self.total_messages > 0 {
                self.total_bytes as f64 / self.total_messages as f64
            } else {
                0.0
            },
            blocked_ms: StatsSummary::from(&self.blocked_stats),
            running_ms: StatsSummary::from(&self.running_stats),
            messages_sent: StatsSummary::from(&self.sent_stats),
        }
    }
}

/// 指标摘要
#[derive(Debug, Clone, Default)]
pub struct MetricsSummary {
    pub instances: u64,
    pub total_messages: u64,
    pub total_bytes: u64,
    pub failed_instances: u64,
    pub mean_message_size: f64,
    pub blocked_ms: StatsSummary,
    pub running_ms: StatsSummary,
    pub messages_sent: StatsSummary,
}

impl std::fmt::Display for MetricsSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "=== Run Summary ===")?;
        writeln!(f, "Instances: {}", self.instances)?;
        writeln!(
            f,
            "Messages: {} ({} bytes, {:.1} bytes/message)",
            self.total_messages, self.total_bytes, self.mean_message_size
        )?;
        if self.failed_instances > 0 {
            writeln!(f, "Failed instances: {}", self.failed_instances)?;
        }
        writeln!(f, "Running time (ms): {}", self.running_ms)?;
        writeln!(f, "Blocked time (ms): {}", self.blocked_ms)?;
        writeln!(f, "Messages per instance: {}", self.messages_sent)?;
        Ok(())
    }
}

/// 统计摘要
#[derive(Debug, Clone, Default)]
pub struct StatsSummary {
    pub count: u64,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub std_dev: f64,
}

impl From<&RunningStats> for StatsSummary {
    fn from(stats: &RunningStats) -> Self {
        Self {
            count: stats.count,
            min: stats.min,
            max: stats.max,
            mean: stats.mean(),
            std_dev: stats.std_dev(),
        }
    }
}

impl std::fmt::Display for StatsSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.count == 0 {
            write!(f, "N/A")
        } else {
            write!(
                f,
                "min={:.3}, max={:.3}, mean={:.3}, std={:.3} (n={})",
                self.min, self.max, self.mean, self.std_dev, self.count
            )
        }
    }
}

/// 在线统计计算器 (Welford's algorithm)
#[derive(Debug, Clone, Default)]
pub struct RunningStats {
    count: u64,
    mean: f64,
    m2: f64,
    min: f64,
    max: f64,
}

impl RunningStats {
    /// 添加新值
    pub fn push(&mut self, value: f64) {
        self.count += 1;

        if self.count == 1 {
            self.min = value;
            self.max = value;
            self.mean = value;
            self.m2 = 0.0;
        } else {
            self.min = self.min.min(value);
            self.max = self.max.max(value);

            let delta = value - self.mean;
            self.mean += delta / self.count as f64;
            let delta2 = value - self.mean;
            self.m2 += delta * delta2;
        }
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.mean
        }
    }

    /// 样本方差
    pub fn variance(&self) -> f64 {
        if self.count < 2 {
            0.0
        } else {
            self.m2 / (self.count - 1) as f64
        }
    }

    pub fn std_dev(&self) -> f64 {
        self.variance().sqrt()
    }

    pub fn min(&self) -> f64 {
        self.min
    }

    pub fn max(&self) -> f64 {
        self.max
    }
}
