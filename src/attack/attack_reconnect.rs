use tracing::info;

use super::attack_config::AttackKind;
use super::{AttackCtx, is_checkpoint};
use crate::conn::connect;
use crate::proto::command::probe_frame;

const NAME: &str = "rapid_reconnect";

/// Connect, send the first half of a frame, hang up. Returns true if a checkpoint halted
/// the run.
pub fn run_rapid_reconnect(
    ctx: &AttackCtx,
    iterations: u32,
    checkpoint_every: u32,
    checkpoint: &mut dyn FnMut(AttackKind) -> bool,
) -> bool {
    let frame = probe_frame();
    let truncated = &frame[..frame.len() / 2];
    let mut completed = 0u32;

    for i in 0..iterations {
        if ctx.stop.is_cancelled() {
            break;
        }

        match connect(&ctx.target, ctx.tuning.reconnect_connect_timeout) {
            Ok(mut conn) => match conn.send(truncated) {
                Ok(()) => {
                    ctx.result.inc_sent();
                    completed += 1;
                }
                Err(e) => ctx.result.record_failure(NAME, &e),
            },
            Err(e) => ctx.result.record_failure(NAME, &e),
        }

        if is_checkpoint(i, checkpoint_every) && checkpoint(AttackKind::RapidReconnect) {
            return true;
        }
    }

    info!(completed, iterations, "[reconnect] done");
    false
}
