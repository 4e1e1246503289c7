use longshot_stitch_core::{align, stitch, synthetic, Alignment, StitchConfig};
use proptest::prelude::*;

fn uncropped() -> StitchConfig {
    StitchConfig {
        crop_top: 0.0,
        crop_bottom: 0.0,
        ..Default::default()
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn recovers_any_offset_in_window(seed in 0u64..1_000, offset in 1u32..=80) {
        let page = synthetic::document(40, 200, seed);
        let frames = synthetic::vertical_recording(&page, 100, &[0, offset]);
        let alignment = align(&frames[0], &frames[1], &uncropped()).unwrap();
        prop_assert_eq!(alignment, Alignment::Matched { offset, score: 0.0 });
    }

    #[test]
    fn constant_scroll_extent_is_linear(
        seed in 0u64..1_000,
        step in 10u32..60,
        count in 1usize..8,
    ) {
        let tops: Vec<u32> = (0..count as u32).map(|i| i * step).collect();
        let page = synthetic::document(24, 100 + step * count as u32, seed);
        let frames = synthetic::vertical_recording(&page, 100, &tops);

        let output = stitch(frames, &uncropped()).unwrap();
        let height: u32 = output.canvases.iter().map(|c| c.image.height()).sum();
        prop_assert_eq!(height, 100 + (count as u32 - 1) * step);
    }

    #[test]
    fn split_outputs_concatenate_to_unsplit(seed in 0u64..1_000, max in 1u32..400) {
        let tops = [0, 25, 60, 90, 130];
        let page = synthetic::document(16, 240, seed);
        let frames = synthetic::vertical_recording(&page, 100, &tops);

        let whole = stitch(frames.clone(), &uncropped()).unwrap();
        let config = StitchConfig { max_canvas_extent: max, ..uncropped() };
        let split = stitch(frames, &config).unwrap();

        for canvas in &split.canvases[..split.canvases.len() - 1] {
            prop_assert_eq!(canvas.image.height(), max);
        }
        let joined: Vec<u8> = split
            .canvases
            .iter()
            .flat_map(|c| c.image.as_raw().iter().copied())
            .collect();
        prop_assert_eq!(&joined, whole.canvases[0].image.as_raw());
    }
}
