//! Health check endpoint

use axum::extract::State;
use axum::Json;
use chrono::Utc;
use sysinfo::System;

use crate::api::server::AppState;
use crate::models::{HealthReport, MemoryUsage};

/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> Json<HealthReport> {
    Json(HealthReport {
        status: "OK".to_string(),
        timestamp: Utc::now(),
        uptime: state.started_at.elapsed().as_secs_f64(),
        memory: memory_usage(),
        blocked_ips: state.guard.blocked_count(),
    })
}

fn memory_usage() -> MemoryUsage {
    let mut sys = System::new();
    sys.refresh_memory();

    let mut usage = MemoryUsage {
        system_total: sys.total_memory(),
        system_used: sys.used_memory(),
        ..MemoryUsage::default()
    };

    if let Ok(pid) = sysinfo::get_current_pid() {
        sys.refresh_process(pid);
        if let Some(process) = sys.process(pid) {
            usage.rss = process.memory();
            usage.virtual_memory = process.virtual_memory();
        }
    }

    usage
}
