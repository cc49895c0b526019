/*!
Scanline sampling and binarization for linear symbologies.

A row of luminance values is thresholded with Otsu's method and collapsed
into alternating light/dark run widths. Run 0 is always light (possibly
zero pixels wide) so that odd-indexed runs are bars.
*/

use image::GrayImage;

/// Rows whose luminance range is below this carry no usable bar contrast
pub const MIN_ROW_CONTRAST: u8 = 32;

/// Otsu threshold of a luminance histogram; pixels below it are dark
fn otsu_threshold(histogram: &[u32; 256], total: u32) -> u8 {
    let total_sum: u64 = histogram
        .iter()
        .enumerate()
        .map(|(value, &count)| value as u64 * count as u64)
        .sum();

    let mut best_threshold = 128u8;
    let mut best_variance = 0.0f64;
    let mut dark_count = 0u64;
    let mut dark_sum = 0u64;

    // Threshold t puts values [0, t) in the dark class
    for threshold in 1..=255usize {
        dark_count += histogram[threshold - 1] as u64;
        dark_sum += (threshold as u64 - 1) * histogram[threshold - 1] as u64;

        let light_count = total as u64 - dark_count;
        if dark_count == 0 || light_count == 0 {
            continue;
        }

        let dark_mean = dark_sum as f64 / dark_count as f64;
        let light_mean = (total_sum - dark_sum) as f64 / light_count as f64;
        let variance =
            dark_count as f64 * light_count as f64 * (dark_mean - light_mean).powi(2);

        if variance > best_variance {
            best_variance = variance;
            best_threshold = threshold as u8;
        }
    }

    best_threshold
}

/// Threshold for one row, or `None` when the row is too flat to hold bars
pub fn row_threshold(row: &[u8]) -> Option<u8> {
    if row.is_empty() {
        return None;
    }

    let mut histogram = [0u32; 256];
    let mut min = u8::MAX;
    let mut max = u8::MIN;
    for &value in row {
        histogram[value as usize] += 1;
        min = min.min(value);
        max = max.max(value);
    }

    if max - min < MIN_ROW_CONTRAST {
        return None;
    }

    Some(otsu_threshold(&histogram, row.len() as u32))
}

/// One binarized row as run widths
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowRuns {
    runs: Vec<u32>,
    offsets: Vec<u32>,
    width: u32,
    reversed: bool,
}

impl RowRuns {
    /// Build runs from already classified pixels (`true` = dark)
    pub fn from_dark_mask<I>(mask: I) -> Self
    where
        I: IntoIterator<Item = bool>,
    {
        let mut runs = vec![0u32];
        let mut current_dark = false;
        let mut width = 0u32;

        for dark in mask {
            if dark != current_dark {
                runs.push(0);
                current_dark = dark;
            }
            if let Some(last) = runs.last_mut() {
                *last += 1;
            }
            width += 1;
        }

        Self::from_runs(runs, width, false)
    }

    fn from_runs(runs: Vec<u32>, width: u32, reversed: bool) -> Self {
        let mut offsets = Vec::with_capacity(runs.len());
        let mut position = 0u32;
        for &run in &runs {
            offsets.push(position);
            position += run;
        }

        Self {
            runs,
            offsets,
            width,
            reversed,
        }
    }

    /// Threshold a luminance row and collapse it into runs
    pub fn from_luma_row(row: &[u8]) -> Option<Self> {
        let threshold = row_threshold(row)?;
        Some(Self::from_dark_mask(row.iter().map(|&v| v < threshold)))
    }

    /// Sample row `y` of a grayscale image
    pub fn sample(image: &GrayImage, y: u32) -> Option<Self> {
        let (width, height) = image.dimensions();
        if y >= height {
            return None;
        }
        let start = y as usize * width as usize;
        let row = image.as_raw().get(start..start + width as usize)?;
        Self::from_luma_row(row)
    }

    /// The same row read right-to-left
    pub fn reversed(&self) -> Self {
        let mut runs: Vec<u32> = self.runs.iter().rev().copied().collect();
        // Keep run 0 light
        if self.runs.len() % 2 == 0 {
            runs.insert(0, 0);
        }
        Self::from_runs(runs, self.width, !self.reversed)
    }

    /// Whether this is a right-to-left reading
    pub fn is_reversed(&self) -> bool {
        self.reversed
    }

    /// Number of runs
    pub fn len(&self) -> usize {
        self.runs.len()
    }

    /// Check if the row has no pixels
    pub fn is_empty(&self) -> bool {
        self.width == 0
    }

    /// Row width in pixels
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Width of run `index`
    pub fn run(&self, index: usize) -> u32 {
        self.runs.get(index).copied().unwrap_or(0)
    }

    /// Whether run `index` is a bar
    pub fn is_dark(index: usize) -> bool {
        index % 2 == 1
    }

    /// `count` consecutive run widths starting at `index`
    pub fn window(&self, index: usize, count: usize) -> Option<&[u32]> {
        self.runs.get(index..index + count)
    }

    /// Pixel position where run `index` starts, in reading direction
    pub fn start(&self, index: usize) -> u32 {
        self.offsets.get(index).copied().unwrap_or(self.width)
    }

    /// Pixel position just past run `index`, in reading direction
    pub fn end(&self, index: usize) -> u32 {
        self.start(index) + self.run(index)
    }

    /// Total pixel width of runs `[index, index + count)`
    pub fn span(&self, index: usize, count: usize) -> u32 {
        self.window(index, count)
            .map(|runs| runs.iter().sum())
            .unwrap_or(0)
    }

    /// Map a reading-direction position back to a left-to-right x coordinate
    pub fn to_image_x(&self, position: f32) -> f32 {
        if self.reversed {
            self.width as f32 - position
        } else {
            position
        }
    }
}
