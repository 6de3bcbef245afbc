//! Controller lifecycle against the synthetic tone backend (no hardware)

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use strata_core::{EngineConfig, EngineError, EngineState, EqualizerController, Event, ToneBackend};

fn controller(tone_hz: f64) -> EqualizerController {
    let config = EngineConfig {
        block_size: 512,
        ..EngineConfig::reference()
    };
    EqualizerController::with_backend(config, Arc::new(ToneBackend::new(tone_hz).unpaced()))
        .unwrap()
}

/// Mean linear power of the newest snapshot's bins in `[low, high]`
fn band_power(controller: &EqualizerController, low: f32, high: f32) -> f64 {
    let deadline = Instant::now() + Duration::from_secs(5);
    // Skip snapshots queued before the last gain change
    controller.spectrum_channel().clear();
    thread::sleep(Duration::from_millis(20));
    controller.spectrum_channel().clear();
    while Instant::now() < deadline {
        if let Some(snapshot) = controller.try_take_spectrum() {
            let bins: Vec<f64> = snapshot
                .bins_between(low, high)
                .map(|(_, db)| 10.0_f64.powf(f64::from(db) / 10.0))
                .collect();
            return bins.iter().sum::<f64>() / bins.len() as f64;
        }
        thread::yield_now();
    }
    panic!("no spectrum published");
}

#[test]
fn start_stop_is_a_two_state_machine() {
    let mut controller = controller(440.0);

    assert!(matches!(controller.stop(), Err(EngineError::NotRunning)));
    controller.start().unwrap();
    assert!(matches!(controller.start(), Err(EngineError::AlreadyRunning)));
    controller.stop().unwrap();
    assert_eq!(controller.state(), EngineState::Stopped);

    let events: Vec<Event> = std::iter::from_fn(|| controller.poll_event()).collect();
    assert_eq!(events.len(), 2);
    assert!(matches!(events[0], Event::Started { sample_rate: 44100, block_size: 512, .. }));
    assert_eq!(events[1], Event::Stopped);
}

#[test]
fn boosting_a_band_raises_its_spectrum() {
    let mut controller = controller(3600.0);
    controller.start().unwrap();

    let flat = band_power(&controller, 3000.0, 4200.0);
    controller.set_gain(3, 12.0).unwrap();
    let boosted = band_power(&controller, 3000.0, 4200.0);
    controller.set_gain(3, -12.0).unwrap();
    let cut = band_power(&controller, 3000.0, 4200.0);

    controller.stop().unwrap();

    assert!(boosted > flat * 4.0, "flat {} boosted {}", flat, boosted);
    assert!(cut < flat / 4.0, "flat {} cut {}", flat, cut);
}

#[test]
fn slow_consumer_never_sees_more_than_capacity() {
    let mut controller = controller(1000.0);
    controller.start().unwrap();
    thread::sleep(Duration::from_millis(50));

    let channel = Arc::clone(controller.spectrum_channel());
    assert!(channel.len() <= channel.capacity());
    controller.stop().unwrap();

    assert!(channel.dropped() > 0);
    assert!(controller.stats().blocks_rendered() > channel.capacity() as u64);
}
