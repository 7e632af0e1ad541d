use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, info};

use super::AttackCtx;
use crate::conn::connect;
use crate::frame::FrameCounter;
use crate::proto::command::probe_frame;

const NAME: &str = "concurrent_flood";

/// `workers` threads, one connection each, hammering the probe frame for `duration`.
/// Returns the number of frames sent.
pub fn run_concurrent_flood(ctx: &AttackCtx, duration: Duration, workers: usize) -> u64 {
    let frame = probe_frame();
    let sent = AtomicU64::new(0);

    thread::scope(|s| {
        for id in 0..workers {
            let (frame, sent) = (&frame, &sent);
            s.spawn(move || flood_worker(ctx, id, frame, duration, sent));
        }
    });

    let sent = sent.into_inner();
    info!(sent, workers, "[flood] done");
    sent
}

fn flood_worker(ctx: &AttackCtx, id: usize, frame: &[u8], duration: Duration, sent: &AtomicU64) {
    let mut conn = match connect(&ctx.target, ctx.tuning.socket_timeout) {
        Ok(c) => c,
        Err(e) => {
            ctx.result.record_failure(NAME, &e);
            return;
        }
    };
    let end = Instant::now() + duration;
    let mut responses = FrameCounter::new();

    while Instant::now() < end && !ctx.stop.is_cancelled() {
        if let Err(e) = conn.send(frame) {
            ctx.result.record_failure(NAME, &e);
            break;
        }
        sent.fetch_add(1, Ordering::Relaxed);
        ctx.result.inc_sent();

        // never stall the send loop on a silent device
        match conn.try_recv() {
            Ok(Some(bytes)) => ctx.result.add_received(responses.feed(&bytes) as u64),
            Ok(None) => {}
            Err(e) => {
                ctx.result.record_failure(NAME, &e);
                break;
            }
        }
        if let Err(e) = conn.set_read_timeout(ctx.tuning.flood_rearm_timeout) {
            ctx.result.record_failure(NAME, &e);
            break;
        }
    }
    debug!(worker = id, "[flood] worker exit");
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;
    use std::io::{BufReader, Read, Write};
    use std::net::TcpStream;

    use crate::attack::tests::ctx_for;
    use crate::conn::tests::{closed_target, stub_server};
    use crate::frame::build_frame;

    /// Reads one request frame at a time and answers it with a minimal frame half of the time.
    fn coin_flip_responder(stream: TcpStream) {
        let Ok(read_half) = stream.try_clone() else { return };
        let mut reader = BufReader::new(read_half);
        let mut writer = stream;
        let resp = build_frame(0x3D, 0x01, &[]);
        let mut req = [0u8; 7];
        while reader.read_exact(&mut req).is_ok() {
            if rand::thread_rng().gen_bool(0.5) && writer.write_all(&resp).is_err() {
                break;
            }
        }
    }

    #[test]
    fn five_workers_against_flaky_device() {
        let ctx = ctx_for(stub_server(coin_flip_responder));
        let sent = run_concurrent_flood(&ctx, Duration::from_millis(500), 5);

        let rec = ctx.result.record();
        assert_eq!(rec.requests_sent, sent);
        assert!(sent > 100, "{sent}");
        // each worker only counts a read after a send
        assert!(rec.responses_received <= rec.requests_sent);
        let ratio = rec.responses_received as f64 / rec.requests_sent as f64;
        assert!((0.3..=0.7).contains(&ratio), "ratio {ratio} ({rec:?})");
        assert!((30.0..=70.0).contains(&rec.success_rate_percent));
    }

    #[test]
    fn every_coalesced_response_is_counted() {
        // answers each request three times in a single write
        let target = stub_server(|stream: TcpStream| {
            let Ok(read_half) = stream.try_clone() else { return };
            let mut reader = BufReader::new(read_half);
            let mut writer = stream;
            let resp = build_frame(0x3D, 0x01, &[0x7E]).repeat(3);
            let mut req = [0u8; 7];
            while reader.read_exact(&mut req).is_ok() {
                if writer.write_all(&resp).is_err() {
                    break;
                }
            }
        });
        let ctx = ctx_for(target);
        let sent = run_concurrent_flood(&ctx, Duration::from_millis(300), 1);
        let received = ctx.result.responses_received();
        assert!(sent > 0);
        // several frames arrive per read and each one counts
        assert!(received > sent, "sent {sent} received {received}");
    }

    #[test]
    fn unreachable_device_counts_connection_failures() {
        let ctx = ctx_for(closed_target());
        let sent = run_concurrent_flood(&ctx, Duration::from_millis(200), 3);
        let rec = ctx.result.record();
        assert_eq!(sent, 0);
        assert_eq!(rec.connection_failures, 3);
        assert_eq!(rec.errors.len(), 3);
    }

    #[test]
    fn stopped_flood_sends_nothing() {
        let ctx = ctx_for(stub_server(coin_flip_responder));
        ctx.stop.cancel();
        assert_eq!(run_concurrent_flood(&ctx, Duration::from_secs(5), 2), 0);
    }
}
