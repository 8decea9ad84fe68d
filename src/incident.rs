/// 事故事件状态 (Detection event state)
///
/// 同一时刻最多只有一个活动事件; 所有读写都经过同一把锁
/// - begin:   置信度越过阈值时创建事件
/// - refresh: 事件持续期间按车辆数重置倒计时
/// - tick:    后台计时器每秒递减倒计时 (不会小于0)
/// - expire:  倒计时归零后清除事件
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Local};
use parking_lot::{Mutex, MutexGuard};
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tracing::info;

/// 经纬度
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

impl GeoPoint {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct IncidentState {
    pub active: bool,
    pub started_at: Option<DateTime<Local>>,
    pub location: Option<GeoPoint>,
    pub wait_minutes: u32,
    pub remaining_secs: u32,
}

impl IncidentState {
    /// 创建新事件; 已有活动事件时不做任何修改并返回 false
    pub fn begin(&mut self, location: GeoPoint, now: DateTime<Local>) -> bool {
        if self.active {
            return false;
        }
        self.active = true;
        self.started_at = Some(now);
        self.location = Some(location);
        true
    }

    /// 按新的预计等待时间重置倒计时
    pub fn refresh(&mut self, wait_minutes: u32) {
        if !self.active {
            return;
        }
        self.wait_minutes = wait_minutes;
        self.remaining_secs = wait_minutes * 60;
    }

    pub fn tick(&mut self) {
        if self.active && self.remaining_secs > 0 {
            self.remaining_secs -= 1;
        }
    }

    /// 倒计时结束则清除事件
    pub fn expire_if_elapsed(&mut self) -> bool {
        if self.active && self.remaining_secs == 0 {
            *self = Self::default();
            return true;
        }
        false
    }

    /// 剩余时间 "分:秒", 秒补齐两位
    pub fn remaining_display(&self) -> String {
        format_remaining(self.remaining_secs)
    }
}

pub fn format_remaining(secs: u32) -> String {
    format!("{}:{:02}", secs / 60, secs % 60)
}

/// 线程间共享的事件状态 (单锁)
#[derive(Debug, Clone, Default)]
pub struct SharedIncident {
    inner: Arc<Mutex<IncidentState>>,
}

impl SharedIncident {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lock(&self) -> MutexGuard<'_, IncidentState> {
        self.inner.lock()
    }

    pub fn snapshot(&self) -> IncidentState {
        *self.inner.lock()
    }
}

/// 启动倒计时任务: 每个周期递减一次, 归零时清除事件
///
/// 处理线程退出 (摄像头断开) 后事件同样在这里清除
pub fn spawn_countdown(incident: SharedIncident, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        // 第一次 tick 立即返回
        interval.tick().await;
        loop {
            interval.tick().await;
            let expired = {
                let mut state = incident.lock();
                state.tick();
                state.expire_if_elapsed()
            };
            if expired {
                info!("✅ 事故倒计时结束, 状态已清除");
            }
        }
    })
}
