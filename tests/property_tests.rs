use proptest::prelude::*;
use scanflow::{ReadStatus, ScanArea, ScanSettings, Scanner, ScannerConfig};
use scanflow_core::{
    BoundaryOptions, ChannelDelays, ChannelLayout, ColorMode, FillMode, LineAssembler, LineFormat,
    PageBoundary, WarmupPolicy,
};
use scanflow_io::{MemoryTransport, SyntheticScan};
use std::time::Duration;

fn assemble(
    scan: &SyntheticScan,
    layout: ChannelLayout,
    delays: ChannelDelays,
    raw: &[u8],
    chunk: usize,
) -> Vec<Vec<u8>> {
    let format = *scan.format();
    let mut assembler = LineAssembler::new(format, layout, delays, WarmupPolicy::RepeatEarliest);
    let mut out = Vec::new();
    let mut line = vec![0u8; format.bytes_per_line()];
    for piece in raw.chunks(chunk) {
        assembler.feed(piece);
        while assembler.next_line(&mut line).unwrap() {
            out.push(line.clone());
        }
    }
    out
}

fn color_mode() -> impl Strategy<Value = ColorMode> {
    prop_oneof![Just(ColorMode::Color24), Just(ColorMode::Color48)]
}

fn layout() -> impl Strategy<Value = ChannelLayout> {
    prop_oneof![Just(ChannelLayout::Planar), Just(ChannelLayout::Interleaved)]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_aligned_lines_carry_their_own_tag(
        mode in color_mode(),
        layout in layout(),
        red in 0usize..6,
        green in 0usize..6,
        pixels in 1usize..6,
        lines in 1usize..30,
        chunk in 1usize..50,
    ) {
        let delays = ChannelDelays::new(red, green, 0);
        let format = LineFormat::new(mode, pixels);
        let scan = SyntheticScan::new(format, layout, delays);
        let raw = scan.row_tagged(lines, None);

        let out = assemble(&scan, layout, delays, &raw, chunk);
        prop_assert_eq!(out.len(), lines);

        let sample = format.sample_bytes();
        let pixel = format.bytes_per_pixel();
        for (n, line) in out.iter().enumerate().skip(delays.max()) {
            let tag = SyntheticScan::tag(n);
            // the last pixel's final channel holds the marker slot
            let tagged = line.len() - sample;
            prop_assert!(line[..tagged].iter().all(|&b| b == tag), "line {}", n);
            prop_assert!(line[tagged..].iter().all(|&b| b == 0));
            prop_assert_eq!(line.len(), pixel * pixels);
        }
    }

    #[test]
    fn prop_chunking_does_not_change_output(
        layout in layout(),
        red in 0usize..5,
        green in 0usize..5,
        lines in 1usize..20,
        chunk in 1usize..64,
    ) {
        let delays = ChannelDelays::new(red, green, 0);
        let format = LineFormat::new(ColorMode::Color24, 3);
        let scan = SyntheticScan::new(format, layout, delays);
        let raw = scan.row_tagged(lines, None);

        let whole = assemble(&scan, layout, delays, &raw, raw.len());
        let pieces = assemble(&scan, layout, delays, &raw, chunk);
        prop_assert_eq!(whole, pieces);
    }

    #[test]
    fn prop_boundary_fills_after_marker(
        mode in marked_mode(),
        fill in fill_mode(),
        pixels in 1usize..10,
        lines in 2usize..40,
        marker_frac in 0.0f64..1.0,
        capture in any::<bool>(),
        hide in any::<bool>(),
        negative in any::<bool>(),
    ) {
        let marker = ((lines as f64 * marker_frac) as usize).min(lines - 1);
        let format = LineFormat::new(mode, pixels);
        let bpl = format.bytes_per_line();
        let options = BoundaryOptions {
            detect: true,
            hide_marker: hide,
            fill,
            capture_next_page: capture,
            invert: negative,
        };
        let mut boundary = PageBoundary::new(format, lines, options).unwrap();

        let raw: Vec<Vec<u8>> = (0..lines).map(|n| page_line(&format, n, marker)).collect();
        let marker_view = delivered(&format, &raw[marker], hide, negative);
        let filler = expected_fill(&format, fill, &marker_view);

        for (n, original) in raw.iter().enumerate() {
            let mut line = original.clone();
            boundary.process(&mut line).unwrap();
            let expected = match &filler {
                Some(filler) if n >= marker => filler.clone(),
                _ => delivered(&format, original, hide, negative),
            };
            prop_assert_eq!(&line, &expected, "line {}", n);
            if hide {
                let slot = &line[bpl - format.sample_bytes()..];
                let marker_sample = if negative { 0x00 } else { 0xff };
                prop_assert!(n >= marker && filler.is_some() || slot.iter().all(|&b| b != marker_sample));
            }
        }
        prop_assert_eq!(boundary.marker_line(), Some(marker));

        let lookahead = boundary.take_lookahead();
        let expected = lines - marker - 1;
        match lookahead {
            Some(mut buffer) => {
                prop_assert!(capture);
                prop_assert_eq!(buffer.lines(), expected);
                let mut line = vec![0u8; bpl];
                for original in &raw[marker + 1..] {
                    prop_assert!(buffer.take_line(&mut line));
                    prop_assert_eq!(&line, original);
                }
            }
            None => {
                prop_assert!(!capture || expected == 0);
            }
        }
    }
}

fn marked_mode() -> impl Strategy<Value = ColorMode> {
    prop_oneof![
        Just(ColorMode::Gray8),
        Just(ColorMode::Gray16),
        Just(ColorMode::Color24),
        Just(ColorMode::Color48),
    ]
}

fn fill_mode() -> impl Strategy<Value = FillMode> {
    prop_oneof![
        Just(FillMode::Raw),
        Just(FillMode::RepeatLast),
        Just(FillMode::Raster),
        Just(FillMode::White),
        Just(FillMode::Black),
        (0u32..0x0100_0000).prop_map(FillMode::Color),
    ]
}

/// Line `n` of a page whose end-of-page marker sits on line `marker`.
fn page_line(format: &LineFormat, n: usize, marker: usize) -> Vec<u8> {
    let bpl = format.bytes_per_line();
    let mut line: Vec<u8> = (0..bpl).map(|i| ((n * 7 + i) % 127) as u8 + 1).collect();
    let slot = if n == marker { 0xff } else { 0x00 };
    line[bpl - format.sample_bytes()..].fill(slot);
    line
}

/// What the caller sees of a regular line: marker slot painted over with
/// the previous pixel, then inverted for negatives.
fn delivered(format: &LineFormat, raw: &[u8], hide: bool, negative: bool) -> Vec<u8> {
    let mut line = raw.to_vec();
    let pixel = format.bytes_per_pixel();
    if hide {
        let last = line.len() - pixel;
        if last >= pixel {
            line.copy_within(last - pixel..last, last);
        } else {
            line[last..].fill(0);
        }
    }
    if negative {
        line.iter_mut().for_each(|b| *b = !*b);
    }
    line
}

/// Filler derived from the delivered marker line; `None` keeps raw lines.
fn expected_fill(format: &LineFormat, fill: FillMode, marker: &[u8]) -> Option<Vec<u8>> {
    let bpl = format.bytes_per_line();
    let pixel = format.bytes_per_pixel();
    let sample = format.sample_bytes();
    let line = match fill {
        FillMode::Raw => return None,
        FillMode::RepeatLast => marker.to_vec(),
        FillMode::White => vec![0xff; bpl],
        FillMode::Black => vec![0x00; bpl],
        FillMode::Raster => (0..format.pixels_per_line)
            .flat_map(|index| vec![if index % 2 == 0 { 0xff } else { 0x00 }; pixel])
            .collect(),
        FillMode::Color(rgb) if format.mode.is_color() => {
            let [_, red, green, blue] = rgb.to_be_bytes();
            (0..format.pixels_per_line)
                .flat_map(|_| [red, green, blue])
                .flat_map(|value| vec![value; sample])
                .collect()
        }
        FillMode::Color(rgb) => vec![rgb.to_be_bytes()[3]; bpl],
    };
    Some(line)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn prop_any_read_size_and_backpressure_give_the_same_page(
        pixels in 1usize..8,
        lines in 1usize..12,
        read_len in 1usize..100,
        chunk_size in 1usize..40,
        channel_capacity in 1usize..3,
    ) {
        let delays = ChannelDelays::new(2, 1, 0);
        let format = LineFormat::new(ColorMode::Color24, pixels);
        let scan = SyntheticScan::new(format, ChannelLayout::Planar, delays);
        let raw = scan.row_tagged(lines, None);
        let expected: Vec<u8> =
            assemble(&scan, ChannelLayout::Planar, delays, &raw, raw.len()).concat();

        let config = ScannerConfig {
            chunk_size,
            channel_capacity,
            ..Default::default()
        };
        let mut scanner = Scanner::open(MemoryTransport::new(raw), config).unwrap();
        let mm = |px: usize| px as f64 * 25.4 / 150.0;
        scanner
            .set_settings(ScanSettings {
                resolution: 150,
                area: ScanArea::new(0.0, 0.0, mm(pixels), mm(lines)),
                ..Default::default()
            })
            .unwrap();
        scanner.start().unwrap();

        let mut page = Vec::new();
        let mut buffer = vec![0u8; read_len];
        loop {
            match scanner.read(&mut buffer).unwrap() {
                ReadStatus::Data(n) => page.extend_from_slice(&buffer[..n]),
                ReadStatus::Pending => std::thread::sleep(Duration::from_micros(200)),
                ReadStatus::EndOfData => break,
            }
        }
        prop_assert_eq!(page, expected);
    }
}
