use rand::seq::SliceRandom;
use tracing::info;

use super::attack_config::AttackKind;
use super::{AttackCtx, is_checkpoint};
use crate::conn::connect;
use crate::proto::command::probe_frame;

const NAME: &str = "connection_overflow";

/// Open more connections than the controller has client slots, send the probe on each in
/// random order, then close them all in another random order. Returns true if a checkpoint
/// halted the run.
pub fn run_connection_overflow(
    ctx: &AttackCtx,
    iterations: u32,
    checkpoint_every: u32,
    checkpoint: &mut dyn FnMut(AttackKind) -> bool,
) -> bool {
    let frame = probe_frame();
    let per_round = ctx.tuning.table_capacity + 3;
    let mut rng = rand::thread_rng();
    let mut max_opened = 0;

    for i in 0..iterations {
        if ctx.stop.is_cancelled() {
            break;
        }

        let mut conns = Vec::with_capacity(per_round);
        for _ in 0..per_round {
            match connect(&ctx.target, ctx.tuning.overflow_connect_timeout) {
                Ok(c) => conns.push(c),
                Err(e) => ctx.result.record_failure(NAME, &e),
            }
        }
        max_opened = max_opened.max(conns.len());

        conns.shuffle(&mut rng);
        for conn in conns.iter_mut() {
            match conn.send(&frame) {
                Ok(()) => ctx.result.inc_sent(),
                Err(e) => ctx.result.record_failure(NAME, &e),
            }
        }
        conns.shuffle(&mut rng);
        for conn in conns {
            drop(conn);
        }

        if is_checkpoint(i, checkpoint_every) && checkpoint(AttackKind::ConnectionOverflow) {
            return true;
        }
    }

    info!(max_opened, "[overflow] done");
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attack::tests::ctx_for;
    use crate::conn::tests::{closed_target, sink, stub_server};

    #[test]
    fn opens_capacity_plus_three_each_iteration() {
        let ctx = ctx_for(stub_server(sink));
        let mut checks = Vec::new();
        let halted = run_connection_overflow(&ctx, 21, 10, &mut |k| {
            checks.push(k);
            false
        });
        assert!(!halted);
        assert_eq!(checks, vec![AttackKind::ConnectionOverflow; 2]);
        assert_eq!(ctx.result.requests_sent(), 21 * 8);
    }

    #[test]
    fn halting_checkpoint_stops_iterations() {
        let ctx = ctx_for(stub_server(sink));
        let halted = run_connection_overflow(&ctx, 30, 10, &mut |_| true);
        assert!(halted);
        // iterations 0..=10 ran before the first checkpoint fired
        assert_eq!(ctx.result.requests_sent(), 11 * 8);
    }

    #[test]
    fn refused_connections_are_counted() {
        let ctx = ctx_for(closed_target());
        run_connection_overflow(&ctx, 2, 10, &mut |_| false);
        let rec = ctx.result.record();
        assert_eq!(rec.requests_sent, 0);
        assert_eq!(rec.connection_failures, 16);
        assert_eq!(rec.errors.len(), 16);
    }
}
