//! Property-based tests for the engine's arithmetic primitives: ring
//! buffer integrity and the whole-note/frame mapping.

use proptest::prelude::*;

use cadenza_pipeline::{AudioFormat, AudioRing, ChannelLayout, Tempo};

proptest! {
    /// Samples pushed through an `AudioRing` in random chunk sizes come
    /// out in order, none lost and none duplicated, across wraparound.
    #[test]
    fn ring_preserves_sample_order(
        chunks in prop::collection::vec(1usize..=32, 1..=64),
        capacity in 32usize..=128,
    ) {
        let format = AudioFormat::new(48000, ChannelLayout::Mono);
        let mut ring = AudioRing::new(format, capacity);

        let mut next_in = 0u32;
        let mut next_out = 0u32;
        let mut out_buf = vec![0.0f32; capacity];

        for chunk in chunks {
            let take = chunk.min(ring.free_count());
            let data: Vec<f32> = (0..take).map(|i| (next_in + i as u32) as f32).collect();
            let pushed = ring.push(&data);
            prop_assert_eq!(pushed, take);
            next_in += take as u32;

            // Drain roughly half of what is buffered.
            let drain = (ring.fill_count() / 2).max(1).min(ring.fill_count());
            let got = ring.pop_into(&mut out_buf[..drain]);
            prop_assert_eq!(got, drain);
            for &sample in &out_buf[..got] {
                prop_assert_eq!(sample, next_out as f32);
                next_out += 1;
            }
        }

        // Fill/free always partition the capacity.
        prop_assert_eq!(ring.fill_count() + ring.free_count(), capacity);
        prop_assert_eq!(next_in - next_out, ring.fill_count() as u32);
    }

    /// Frame/whole-note conversion round-trips within a frame's worth of
    /// rounding error for any sane tempo, rate, and position.
    #[test]
    fn tempo_conversion_round_trips(
        bpm in 20.0f64..300.0,
        sample_rate in prop::sample::select(vec![22050u32, 44100, 48000, 96000]),
        frames in 0u64..50_000_000,
    ) {
        let tempo = Tempo::new(bpm);
        let whole_notes = tempo.frames_to_whole_notes(frames, sample_rate);
        let back = tempo.whole_notes_to_frames(whole_notes, sample_rate);
        prop_assert!(back.abs_diff(frames) <= 1);
    }

    /// The conversion is exactly linear in the per-frame increment: the
    /// monitor's incremental advance matches the bulk conversion.
    #[test]
    fn tempo_conversion_is_linear(
        bpm in 20.0f64..300.0,
        sample_rate in prop::sample::select(vec![22050u32, 44100, 48000, 96000]),
        frames in 0u64..1_000_000,
    ) {
        let tempo = Tempo::new(bpm);
        let bulk = tempo.frames_to_whole_notes(frames, sample_rate);
        let per_frame = tempo.whole_notes_per_frame(sample_rate);
        prop_assert_eq!(bulk, frames as f64 * per_frame);
    }

    /// Positions never map to negative frames and never decrease.
    #[test]
    fn tempo_mapping_is_monotonic(
        bpm in 20.0f64..300.0,
        a in -10.0f64..100.0,
        b in -10.0f64..100.0,
    ) {
        let tempo = Tempo::new(bpm);
        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
        let lo_frames = tempo.whole_notes_to_frames(lo, 48000);
        let hi_frames = tempo.whole_notes_to_frames(hi, 48000);
        prop_assert!(lo_frames <= hi_frames);
    }
}
