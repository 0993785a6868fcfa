//! 技师匹配
//!
//! 纯排序函数加一层从存储读取的薄服务。匹配本身无副作用，
//! 不修改任何技师或工单状态；空结果不是错误，由调用方决定升级策略。

use std::cmp::Ordering;
use std::sync::Arc;
use std::time::Duration;

use tracing::debug;
use uuid::Uuid;

use dispatch_domain::{
    DispatchError, DispatchResult, TechnicianFilter, TechnicianRepository, TechnicianSnapshot,
    Ticket, TicketRepository,
};

use crate::config::{MatchingConfig, StoreConfig};
use crate::geo;
use crate::timeout::with_timeout;

/// 工单类别到所需技能的映射；未知类别视为不限技能
pub fn skill_for_category(category: &str) -> Option<&str> {
    const KNOWN_SKILLS: &[&str] = &[
        "plumbing",
        "electrical",
        "hvac",
        "appliance_repair",
        "carpentry",
        "painting",
        "cleaning",
        "security",
        "water_tank",
        "inverter_repair",
        "gas_connection",
    ];
    KNOWN_SKILLS.iter().find(|s| **s == category).copied()
}

#[derive(Debug, Clone)]
pub struct MatchOptions {
    pub max_distance_km: f64,
    /// 强制改派时允许把忙碌技师纳入候选
    pub include_busy: bool,
    /// 要求必须有已知位置，未知位置的技师被排除而不是垫底
    pub require_position: bool,
    pub avg_speed_kmh: f64,
}

impl Default for MatchOptions {
    fn default() -> Self {
        Self {
            max_distance_km: 10.0,
            include_busy: false,
            require_position: false,
            avg_speed_kmh: geo::DEFAULT_AVG_SPEED_KMH,
        }
    }
}

impl MatchOptions {
    pub fn from_config(config: &MatchingConfig) -> Self {
        Self {
            max_distance_km: config.max_distance_km,
            avg_speed_kmh: config.avg_speed_kmh,
            ..Default::default()
        }
    }
}

/// 候选技师及其计算出的距离与预计到达时间
#[derive(Debug, Clone)]
pub struct Candidate {
    pub technician: TechnicianSnapshot,
    pub distance_meters: Option<f64>,
    pub eta_minutes: Option<i64>,
}

/// 过滤并排序候选技师
///
/// 顺序：有已知位置的按距离升序，距离相同按工作量再按技师 id；
/// 位置未知的保留在队尾，除非 require_position。确定性：相同输入
/// 与相同技师池必然产生相同顺序。
pub fn rank_candidates(
    ticket: &Ticket,
    pool: &[TechnicianSnapshot],
    options: &MatchOptions,
) -> Vec<Candidate> {
    let required_skill = skill_for_category(&ticket.category);
    let max_distance_meters = options.max_distance_km * 1000.0;

    let mut known: Vec<Candidate> = Vec::new();
    let mut unknown: Vec<Candidate> = Vec::new();

    for technician in pool {
        let status_ok = technician.is_available()
            || (options.include_busy
                && matches!(
                    technician.status,
                    dispatch_domain::TechnicianStatus::Busy
                ));
        if !status_ok {
            continue;
        }
        if let Some(skill) = required_skill {
            if !technician.has_skill(skill) {
                continue;
            }
        }

        let distance = match (ticket.position, technician.position) {
            (Some(target), Some(pos)) if pos.is_valid() => {
                Some(geo::distance_meters(pos, target))
            }
            _ => None,
        };

        match distance {
            Some(d) => {
                if d > max_distance_meters {
                    continue;
                }
                known.push(Candidate {
                    technician: technician.clone(),
                    distance_meters: Some(d),
                    eta_minutes: geo::estimate_eta_minutes(d, options.avg_speed_kmh),
                });
            }
            None => {
                if options.require_position {
                    continue;
                }
                unknown.push(Candidate {
                    technician: technician.clone(),
                    distance_meters: None,
                    eta_minutes: None,
                });
            }
        }
    }

    known.sort_by(|a, b| {
        a.distance_meters
            .partial_cmp(&b.distance_meters)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.technician.workload.cmp(&b.technician.workload))
            .then_with(|| a.technician.id.cmp(&b.technician.id))
    });
    unknown.sort_by(|a, b| {
        a.technician
            .workload
            .cmp(&b.technician.workload)
            .then_with(|| a.technician.id.cmp(&b.technician.id))
    });

    known.extend(unknown);
    debug!(
        ticket_id = %ticket.id,
        candidates = known.len(),
        "技师匹配完成"
    );
    known
}

/// 匹配服务：加载工单与技师池后委托给纯排序函数
pub struct MatcherService {
    ticket_repo: Arc<dyn TicketRepository>,
    technician_repo: Arc<dyn TechnicianRepository>,
    matching: MatchingConfig,
    store_timeout: Duration,
}

impl MatcherService {
    pub fn new(
        ticket_repo: Arc<dyn TicketRepository>,
        technician_repo: Arc<dyn TechnicianRepository>,
        matching: MatchingConfig,
        store: &StoreConfig,
    ) -> Self {
        Self {
            ticket_repo,
            technician_repo,
            matching,
            store_timeout: Duration::from_secs(store.operation_timeout_seconds),
        }
    }

    pub async fn find_candidates(
        &self,
        ticket_id: Uuid,
        options: Option<MatchOptions>,
    ) -> DispatchResult<Vec<Candidate>> {
        let ticket = with_timeout(self.store_timeout, "load_ticket", async {
            self.ticket_repo.get_by_id(ticket_id).await
        })
        .await?
        .ok_or_else(|| DispatchError::ticket_not_found(ticket_id))?;

        let pool = with_timeout(self.store_timeout, "load_technician_pool", async {
            self.technician_repo.list(&TechnicianFilter::default()).await
        })
        .await?;

        let options = options.unwrap_or_else(|| MatchOptions::from_config(&self.matching));
        Ok(rank_candidates(&ticket, &pool, &options))
    }
}
