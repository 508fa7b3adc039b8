#![no_main]

use libfuzzer_sys::fuzz_target;
use scanflow_core::{
    BoundaryOptions, ChannelDelays, ChannelLayout, ColorMode, FillMode, LineAssembler, LineFormat,
    PageBoundary, WarmupPolicy,
};

const MODES: [ColorMode; 5] = [
    ColorMode::Lineart,
    ColorMode::Gray8,
    ColorMode::Gray16,
    ColorMode::Color24,
    ColorMode::Color48,
];

fuzz_target!(|data: &[u8]| {
    let [mode, pixels, red, green, lines, chunk, flags, rest @ ..] = data else {
        return;
    };

    let format = LineFormat::new(MODES[*mode as usize % MODES.len()], *pixels as usize % 32 + 1);
    let layout = if flags & 1 == 0 {
        ChannelLayout::Planar
    } else {
        ChannelLayout::Interleaved
    };
    let warmup = if flags & 2 == 0 {
        WarmupPolicy::RepeatEarliest
    } else {
        WarmupPolicy::ZeroFill
    };
    let delays = ChannelDelays::new(*red as usize % 16, *green as usize % 16, 0);
    let total = *lines as usize % 64 + 1;
    let options = BoundaryOptions {
        detect: true,
        hide_marker: flags & 4 != 0,
        fill: if flags & 8 == 0 { FillMode::RepeatLast } else { FillMode::Raster },
        capture_next_page: flags & 16 != 0,
        invert: flags & 32 != 0,
    };

    let mut assembler = LineAssembler::new(format, layout, delays, warmup);
    let Ok(mut boundary) = PageBoundary::new(format, total, options) else {
        return;
    };
    let mut line = vec![0u8; format.bytes_per_line()];
    let mut produced = 0;

    for piece in rest.chunks(*chunk as usize + 1) {
        assembler.feed(piece);
        while produced < total && assembler.next_line(&mut line).unwrap_or(false) {
            boundary
                .process(&mut line)
                .expect("line of the right size within the page");
            produced += 1;
        }
    }

    if let Some(mut lookahead) = boundary.take_lookahead() {
        assert!(lookahead.lines() < total);
        while lookahead.take_line(&mut line) {}
        assert!(lookahead.is_empty());
    }
});
