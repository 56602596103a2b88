/// How a download's bytes are fetched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferMode {
    Contiguous,
    Segmented {
        segment_size: u64,
        /// Number of full-size segments.
        segment_count: u64,
        /// Length of the trailing short segment, 0 if there is none.
        remainder: u64,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferPlan {
    /// Total resource size, -1 when the server did not report one.
    pub total_size: i64,
    pub mode: TransferMode,
}

/// One byte range of a segmented transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Segment {
    pub index: usize,
    pub start: u64,
    pub len: u64,
}

impl Segment {
    /// Inclusive offset of the last byte in the segment.
    pub fn end(&self) -> u64 {
        self.start + self.len - 1
    }

    pub fn range_header(&self) -> String {
        format!("bytes={}-{}", self.start, self.end())
    }
}

/// Picks the transfer mode for a download. Pure and deterministic.
pub fn select(
    total_size: i64,
    accepts_ranges: bool,
    segment_size: u64,
    force_contiguous: bool,
) -> TransferPlan {
    let contiguous = TransferPlan {
        total_size,
        mode: TransferMode::Contiguous,
    };

    if total_size <= 0 || force_contiguous || !accepts_ranges {
        return contiguous;
    }
    let size = total_size as u64;
    if segment_size == 0 || segment_size >= size {
        return contiguous;
    }

    let segment_count = size / segment_size;
    TransferPlan {
        total_size,
        mode: TransferMode::Segmented {
            segment_size,
            segment_count,
            remainder: size - segment_size * segment_count,
        },
    }
}

impl TransferPlan {
    pub fn is_segmented(&self) -> bool {
        matches!(self.mode, TransferMode::Segmented { .. })
    }

    /// Number of fetch tasks the plan needs.
    pub fn task_count(&self) -> usize {
        match self.mode {
            TransferMode::Contiguous => 1,
            TransferMode::Segmented {
                segment_count,
                remainder,
                ..
            } => segment_count as usize + usize::from(remainder > 0),
        }
    }

    /// Expands a segmented plan into its ordered segments. Contiguous plans
    /// have none.
    pub fn segments(&self) -> Vec<Segment> {
        let TransferMode::Segmented {
            segment_size,
            segment_count,
            remainder,
        } = self.mode
        else {
            return Vec::new();
        };

        let mut segments = (0..segment_count)
            .map(|i| Segment {
                index: i as usize,
                start: i * segment_size,
                len: segment_size,
            })
            .collect::<Vec<_>>();

        if remainder > 0 {
            segments.push(Segment {
                index: segments.len(),
                start: segment_size * segment_count,
                len: remainder,
            });
        }
        segments
    }
}
