/*!
Synthetic symbol rendering for tests and benchmarks.

Encoders produce module sequences (`true` = bar) from the same width tables
the readers use; renderers turn them into rows, grayscale images or RGBA
frames with white quiet zones. QR symbols are encoded with the `qrcode`
crate and drawn the same way.
*/

use crate::readers::code128::{
    CODE_PATTERNS, CODE_START_B, CODE_START_C, CODE_STOP, STOP_TRAILING_BAR,
};
use crate::readers::code39::{ALPHABET, ASTERISK_ENCODING, CHARACTER_ENCODINGS};
use crate::readers::upc_ean::{
    check_digit, FIRST_DIGIT_ENCODINGS, G_PATTERNS, L_PATTERNS, MIDDLE_PATTERN, START_END_PATTERN,
};
use crate::scanline::RowRuns;
use image::{GrayImage, Luma};
use shared::Frame;
use std::time::Instant;

/// Append `widths` as alternating modules, starting dark or light
fn push_widths(modules: &mut Vec<bool>, widths: &[u8], start_dark: bool) {
    let mut dark = start_dark;
    for &width in widths {
        modules.extend(std::iter::repeat(dark).take(width as usize));
        dark = !dark;
    }
}

fn parse_digits(digits: &str) -> Vec<u8> {
    assert!(
        digits.bytes().all(|b| b.is_ascii_digit()),
        "non-digit in {:?}",
        digits
    );
    digits.bytes().map(|b| b - b'0').collect()
}

/// Append the check digit when `digits` is one short of `len`
fn with_check_digit(digits: &str, len: usize) -> Vec<u8> {
    let mut out = parse_digits(digits);
    if out.len() == len - 1 {
        out.push(check_digit(&out));
    }
    assert_eq!(out.len(), len, "expected {} digits in {:?}", len, digits);
    out
}

/// EAN-13 modules for 12 digits (check digit computed) or 13 (used as is)
pub fn ean13_modules(digits: &str) -> Vec<bool> {
    let digits = with_check_digit(digits, 13);
    let parity = FIRST_DIGIT_ENCODINGS[digits[0] as usize];

    let mut modules = Vec::with_capacity(95);
    push_widths(&mut modules, &START_END_PATTERN, true);
    for (x, &d) in digits[1..7].iter().enumerate() {
        let even = parity & (1 << (5 - x)) != 0;
        let widths = if even { &G_PATTERNS[d as usize] } else { &L_PATTERNS[d as usize] };
        push_widths(&mut modules, widths, false);
    }
    push_widths(&mut modules, &MIDDLE_PATTERN, false);
    for &d in &digits[7..] {
        push_widths(&mut modules, &L_PATTERNS[d as usize], true);
    }
    push_widths(&mut modules, &START_END_PATTERN, true);
    modules
}

/// UPC-A modules for 11 or 12 digits
pub fn upc_a_modules(digits: &str) -> Vec<bool> {
    ean13_modules(&format!("0{}", digits))
}

/// EAN-8 modules for 7 digits (check digit computed) or 8 (used as is)
pub fn ean8_modules(digits: &str) -> Vec<bool> {
    let digits = with_check_digit(digits, 8);

    let mut modules = Vec::with_capacity(67);
    push_widths(&mut modules, &START_END_PATTERN, true);
    for &d in &digits[..4] {
        push_widths(&mut modules, &L_PATTERNS[d as usize], false);
    }
    push_widths(&mut modules, &MIDDLE_PATTERN, false);
    for &d in &digits[4..] {
        push_widths(&mut modules, &L_PATTERNS[d as usize], true);
    }
    push_widths(&mut modules, &START_END_PATTERN, true);
    modules
}

fn code128_symbol(codes: Vec<u8>) -> Vec<bool> {
    let check = crate::readers::code128::checksum(&codes);

    let mut modules = Vec::new();
    for code in codes.into_iter().chain([check, CODE_STOP]) {
        push_widths(&mut modules, &CODE_PATTERNS[code as usize], true);
    }
    push_widths(&mut modules, &[STOP_TRAILING_BAR], true);
    modules
}

/// Code 128 modules using code set B (printable ASCII)
pub fn code128_modules(text: &str) -> Vec<bool> {
    let mut codes = vec![CODE_START_B];
    for b in text.bytes() {
        assert!((b' '..=b'\x7f').contains(&b), "not in code set B: {:?}", b);
        codes.push(b - b' ');
    }
    code128_symbol(codes)
}

/// Code 128 modules using code set C; `digits` must have even length
pub fn code128c_modules(digits: &str) -> Vec<bool> {
    let digits = parse_digits(digits);
    assert!(digits.len() % 2 == 0, "code set C needs digit pairs");
    let mut codes = vec![CODE_START_C];
    codes.extend(digits.chunks(2).map(|pair| pair[0] * 10 + pair[1]));
    code128_symbol(codes)
}

fn push_code39_char(modules: &mut Vec<bool>, encoding: u16) {
    let widths: Vec<u8> = (0..9)
        .map(|i| if encoding & (1 << (8 - i)) != 0 { 3 } else { 1 })
        .collect();
    push_widths(modules, &widths, true);
}

/// Code 39 modules with `*` delimiters, narrow 1 module, wide 3
pub fn code39_modules(text: &str) -> Vec<bool> {
    let mut encodings = vec![ASTERISK_ENCODING];
    for b in text.bytes() {
        let index = ALPHABET
            .iter()
            .position(|&a| a == b)
            .unwrap_or_else(|| panic!("not in Code 39 alphabet: {:?}", b as char));
        encodings.push(CHARACTER_ENCODINGS[index]);
    }
    encodings.push(ASTERISK_ENCODING);

    let mut modules = Vec::new();
    for (i, encoding) in encodings.into_iter().enumerate() {
        if i > 0 {
            // Narrow inter-character gap
            modules.push(false);
        }
        push_code39_char(&mut modules, encoding);
    }
    modules
}

/// One row with `quiet_modules` of white on each side
pub fn row_runs(modules: &[bool], module_px: u32, quiet_modules: u32) -> RowRuns {
    let quiet = std::iter::repeat(false).take((quiet_modules * module_px) as usize);
    let body = modules
        .iter()
        .flat_map(|&dark| std::iter::repeat(dark).take(module_px as usize));
    RowRuns::from_dark_mask(quiet.clone().chain(body).chain(quiet))
}

/// Horizontally centered bars spanning the middle 60% of the rows
pub fn gray_linear(modules: &[bool], module_px: u32, width: u32, height: u32) -> GrayImage {
    let symbol_width = modules.len() as u32 * module_px;
    assert!(symbol_width <= width, "symbol wider than image");
    let left = (width - symbol_width) / 2;
    let top = height / 5;
    let bottom = height - height / 5;

    GrayImage::from_fn(width, height, |x, y| {
        let dark = y >= top
            && y < bottom
            && x >= left
            && x < left + symbol_width
            && modules[((x - left) / module_px) as usize];
        Luma([if dark { 0 } else { 255 }])
    })
}

/// RGBA rendering of [`gray_linear`]
pub fn rgba_linear(modules: &[bool], module_px: u32, width: u32, height: u32) -> Vec<u8> {
    gray_linear(modules, module_px, width, height)
        .as_raw()
        .iter()
        .flat_map(|&v| [v, v, v, 255])
        .collect()
}

/// Frame holding a rendered linear symbol, captured at `captured_at`
pub fn linear_frame_at(
    modules: &[bool],
    module_px: u32,
    width: u32,
    height: u32,
    captured_at: Instant,
) -> Frame {
    Frame::captured_at(
        rgba_linear(modules, module_px, width, height),
        width,
        height,
        captured_at,
    )
}

/// Frame holding a rendered linear symbol, captured now
pub fn linear_frame(modules: &[bool], module_px: u32, width: u32, height: u32) -> Frame {
    linear_frame_at(modules, module_px, width, height, Instant::now())
}

/// QR symbol as rows of modules (`true` = dark), without quiet zone
pub fn qr_modules(text: &str) -> Vec<Vec<bool>> {
    let code = qrcode::QrCode::new(text.as_bytes())
        .unwrap_or_else(|e| panic!("cannot encode {:?} as QR: {}", text, e));
    let width = code.width();
    code.to_colors()
        .chunks(width)
        .map(|row| row.iter().map(|&c| c == qrcode::Color::Dark).collect())
        .collect()
}

/// Side length in pixels of [`qr_modules`] drawn at `module_px`
pub fn qr_side_px(text: &str, module_px: u32) -> u32 {
    qr_modules(text).len() as u32 * module_px
}

/// White image with a QR symbol whose top-left corner sits at `origin`
pub fn gray_qr(
    text: &str,
    module_px: u32,
    width: u32,
    height: u32,
    origin: (u32, u32),
) -> GrayImage {
    let modules = qr_modules(text);
    let side = modules.len() as u32 * module_px;
    let (left, top) = origin;
    assert!(
        left + side <= width && top + side <= height,
        "QR symbol does not fit"
    );

    GrayImage::from_fn(width, height, |x, y| {
        let dark = x >= left
            && x < left + side
            && y >= top
            && y < top + side
            && modules[((y - top) / module_px) as usize][((x - left) / module_px) as usize];
        Luma([if dark { 0 } else { 255 }])
    })
}

/// Frame holding a rendered QR symbol, captured now
pub fn qr_frame(
    text: &str,
    module_px: u32,
    width: u32,
    height: u32,
    origin: (u32, u32),
) -> Frame {
    let rgba: Vec<u8> = gray_qr(text, module_px, width, height, origin)
        .as_raw()
        .iter()
        .flat_map(|&v| [v, v, v, 255])
        .collect();
    Frame::new(rgba, width, height)
}

/// Plain white frame
pub fn blank_frame(width: u32, height: u32) -> Frame {
    Frame::new(vec![255u8; width as usize * height as usize * 4], width, height)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_module_counts() {
        assert_eq!(ean13_modules("400638133393").len(), 95);
        assert_eq!(ean8_modules("1234567").len(), 67);
        // start + 3 chars + check + stop (13)
        assert_eq!(code128_modules("abc").len(), 11 * 5 + 13);
        // 4 characters of 15 modules, 3 gaps
        assert_eq!(code39_modules("AB").len(), 4 * 15 + 3);
    }

    #[test]
    fn test_ean8_left_half_uses_l_codes() {
        let modules = ean8_modules("1234567");
        // Start guard 101, then '1' = 0011001
        let prefix: Vec<u8> = modules[..10].iter().map(|&m| m as u8).collect();
        assert_eq!(prefix, vec![1, 0, 1, 0, 0, 1, 1, 0, 0, 1]);
    }

    #[test]
    fn test_qr_rendering() {
        // 10 bytes fit a version 1 symbol (21 modules)
        assert_eq!(qr_modules("SHELF-0042").len(), 21);
        assert_eq!(qr_side_px("SHELF-0042", 5), 105);

        let image = gray_qr("SHELF-0042", 5, 320, 240, (100, 60));
        // Finder pattern corner is dark, the quiet zone around it is not
        assert_eq!(image.get_pixel(100, 60)[0], 0);
        assert_eq!(image.get_pixel(99, 60)[0], 255);
        assert_eq!(image.get_pixel(100, 59)[0], 255);

        let frame = qr_frame("SHELF-0042", 5, 320, 240, (100, 60));
        assert!(frame.validate().is_ok());
    }

    #[test]
    fn test_rgba_frame_dimensions() {
        let frame = linear_frame(&ean8_modules("1234567"), 4, 640, 480);
        assert_eq!(frame.data().len(), 640 * 480 * 4);
        assert!(frame.validate().is_ok());
    }
}
