//! aiocc -- incident orchestration for business metrics.
//!
//! This crate provides anomaly scoring over sales, marketing and support
//! streams, root-cause correlation, remediation planning with an approval
//! gate, tiered action dispatch, sessions, and a cron-driven daemon.

pub mod analysis;
pub mod api;
pub mod app;
pub mod config;
pub mod datasource;
pub mod detect;
pub mod dispatch;
pub mod integrations;
pub mod pipeline;
pub mod plan;
pub mod scheduler;
pub mod session;
pub mod storage;

use anyhow::Result;

use crate::app::AppContext;

/// Start the aiocc daemon: API server and cycle scheduler.
pub async fn serve(ctx: AppContext, bind: &str) -> Result<()> {
    let mut state = api::state::AppState::from_context(&ctx);

    // 1. Start Scheduler Engine (background task)
    if ctx.config.schedule.enabled {
        let schedule = scheduler::CycleSchedule::parse(&ctx.config.schedule.cron)?;
        state = state.with_schedule(schedule.clone());
        let supervisor = ctx.supervisor.clone();
        tokio::spawn(async move {
            scheduler::run_scheduler_loop(schedule, supervisor).await;
        });
    } else {
        tracing::info!("Scheduler disabled; cycles run only on request");
    }

    // 2. Start API Server
    let addr: std::net::SocketAddr = bind.parse()?;
    let app = api::router(state);

    tracing::info!(%addr, "aiocc listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
