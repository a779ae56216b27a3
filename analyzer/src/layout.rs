// layout.rs — Cache-line map for record layouts
//
// Maps every field of a record (including bases and nested records) to its
// absolute byte offset and the inclusive range of cache-line buckets it
// overlaps. Detectors consume the derived views: straddling fields, mutable
// and atomic pairs sharing a line, and false-sharing candidate lines.
//
// Preconditions: the record is a complete definition; callers pre-filter.
// Postconditions: buckets cover the whole record; a field spanning k lines
//   appears in all k buckets.
// Failure modes: `LayoutError::IncompleteRecord` on contract violation.
// Side effects: none (pure function of the record; memoized by identity).

use std::collections::HashMap;
use std::rc::Rc;

use crate::tu::{RecordDecl, TranslationUnit, TypeKind};

/// Default coherence-transfer granule for the target.
pub const DEFAULT_LINE_BYTES: u64 = 64;

#[derive(Debug, thiserror::Error)]
pub enum LayoutError {
    #[error("cache-line map requires a complete record definition: '{0}'")]
    IncompleteRecord(String),
}

// ── Entries and buckets ─────────────────────────────────────────────────────

/// One field flattened to an absolute offset within the outermost record.
#[derive(Debug, Clone)]
pub struct FieldLineEntry {
    pub name: String,
    pub offset_bytes: u64,
    pub size_bytes: u64,
    /// First and last cache-line index the field overlaps (inclusive).
    pub start_line: u64,
    pub end_line: u64,
    pub straddles: bool,
    pub is_atomic: bool,
    pub is_mutable: bool,
}

/// One record-relative cache line and the fields overlapping it.
#[derive(Debug, Clone, Default)]
pub struct LineBucket {
    pub line_index: u64,
    /// Indices into `CacheLineMap::fields`.
    pub fields: Vec<usize>,
    pub atomic_count: u32,
    pub mutable_count: u32,
}

/// An unordered pair of fields sharing one cache line.
#[derive(Debug, Clone, Copy)]
pub struct SharedLinePair {
    pub a: usize,
    pub b: usize,
    pub line_index: u64,
}

// ── The map ─────────────────────────────────────────────────────────────────

#[derive(Debug)]
pub struct CacheLineMap {
    line_bytes: u64,
    size_bytes: u64,
    lines_spanned: u64,
    fields: Vec<FieldLineEntry>,
    buckets: Vec<LineBucket>,
    total_atomics: u32,
    total_mutables: u32,
}

impl CacheLineMap {
    /// Build the map for `record` with the configured line width.
    ///
    /// Walks non-virtual direct bases at their offsets, then virtual bases,
    /// then direct fields. Nested non-atomic record fields are recursed into
    /// so padded inner records stay visible. Zero-sized fields are dropped;
    /// bit-fields arrive from the producer as their enclosing byte range.
    pub fn build(
        record: &RecordDecl,
        tu: &TranslationUnit,
        line_bytes: u64,
    ) -> Result<Self, LayoutError> {
        if !record.is_complete {
            return Err(LayoutError::IncompleteRecord(record.name.clone()));
        }

        let line_bytes = line_bytes.max(1);
        let size_bytes = record.size_bytes;
        let lines_spanned = size_bytes.div_ceil(line_bytes);

        let mut map = Self {
            line_bytes,
            size_bytes,
            lines_spanned,
            fields: Vec::new(),
            buckets: Vec::new(),
            total_atomics: 0,
            total_mutables: 0,
        };

        let index = tu.record_index();
        map.collect_fields(record, &index, 0);
        map.build_buckets();
        Ok(map)
    }

    fn collect_fields(
        &mut self,
        record: &RecordDecl,
        index: &HashMap<&str, &RecordDecl>,
        base_offset: u64,
    ) {
        // Non-virtual bases first, then virtual bases, matching the
        // producer's subobject layout order.
        for base in record.bases.iter().filter(|b| !b.is_virtual) {
            if let Some(base_record) = index.get(base.record.as_str()) {
                if base_record.is_complete {
                    self.collect_fields(base_record, index, base_offset + base.offset_bytes);
                }
            }
        }
        for base in record.bases.iter().filter(|b| b.is_virtual) {
            if let Some(base_record) = index.get(base.record.as_str()) {
                if base_record.is_complete {
                    self.collect_fields(base_record, index, base_offset + base.offset_bytes);
                }
            }
        }

        for field in &record.fields {
            let size = field.ty.size_bytes;
            if size == 0 {
                continue;
            }

            let offset = base_offset + field.offset_bytes;
            let start_line = offset / self.line_bytes;
            let end_line = (offset + size - 1) / self.line_bytes;

            let is_atomic = field.ty.is_atomic();
            let is_mutable = field.is_mutable();

            if is_atomic {
                self.total_atomics += 1;
            }
            if is_mutable {
                self.total_mutables += 1;
            }

            self.fields.push(FieldLineEntry {
                name: field.name.clone(),
                offset_bytes: offset,
                size_bytes: size,
                start_line,
                end_line,
                straddles: start_line != end_line,
                is_atomic,
                is_mutable,
            });

            // Expose sub-fields of nested records at absolute offsets.
            if !is_atomic {
                if let TypeKind::Record { name } = &field.ty.kind {
                    if let Some(nested) = index.get(name.as_str()) {
                        if nested.is_complete {
                            self.collect_fields(nested, index, offset);
                        }
                    }
                }
            }
        }
    }

    fn build_buckets(&mut self) {
        if self.lines_spanned == 0 {
            return;
        }
        self.buckets = (0..self.lines_spanned)
            .map(|i| LineBucket {
                line_index: i,
                ..LineBucket::default()
            })
            .collect();

        for (fi, f) in self.fields.iter().enumerate() {
            for line in f.start_line..=f.end_line.min(self.lines_spanned - 1) {
                let bucket = &mut self.buckets[line as usize];
                bucket.fields.push(fi);
                if f.is_atomic {
                    bucket.atomic_count += 1;
                }
                if f.is_mutable {
                    bucket.mutable_count += 1;
                }
            }
        }
    }

    // ── Read-only views ─────────────────────────────────────────────────────

    pub fn line_bytes(&self) -> u64 {
        self.line_bytes
    }

    pub fn size_bytes(&self) -> u64 {
        self.size_bytes
    }

    pub fn lines_spanned(&self) -> u64 {
        self.lines_spanned
    }

    pub fn fields(&self) -> &[FieldLineEntry] {
        &self.fields
    }

    pub fn buckets(&self) -> &[LineBucket] {
        &self.buckets
    }

    pub fn total_atomic_fields(&self) -> u32 {
        self.total_atomics
    }

    pub fn total_mutable_fields(&self) -> u32 {
        self.total_mutables
    }

    pub fn field(&self, idx: usize) -> &FieldLineEntry {
        &self.fields[idx]
    }

    /// Every entry whose byte range crosses a line boundary.
    pub fn straddling_fields(&self) -> Vec<&FieldLineEntry> {
        self.fields.iter().filter(|f| f.straddles).collect()
    }

    /// Every unordered pair of mutable entries sharing a bucket.
    pub fn mutable_pairs_on_same_line(&self) -> Vec<SharedLinePair> {
        self.pairs_matching(|f| f.is_mutable)
    }

    /// Every unordered pair of atomic entries sharing a bucket.
    pub fn atomic_pairs_on_same_line(&self) -> Vec<SharedLinePair> {
        self.pairs_matching(|f| f.is_atomic)
    }

    fn pairs_matching(&self, pred: impl Fn(&FieldLineEntry) -> bool) -> Vec<SharedLinePair> {
        let mut result = Vec::new();
        for bucket in &self.buckets {
            for i in 0..bucket.fields.len() {
                if !pred(&self.fields[bucket.fields[i]]) {
                    continue;
                }
                for j in (i + 1)..bucket.fields.len() {
                    if !pred(&self.fields[bucket.fields[j]]) {
                        continue;
                    }
                    result.push(SharedLinePair {
                        a: bucket.fields[i],
                        b: bucket.fields[j],
                        line_index: bucket.line_index,
                    });
                }
            }
        }
        result
    }

    /// Buckets holding at least one atomic and strictly more mutable than
    /// atomic entries — a mixed write surface.
    pub fn false_sharing_candidate_lines(&self) -> Vec<u64> {
        self.buckets
            .iter()
            .filter(|b| b.atomic_count > 0 && b.mutable_count > b.atomic_count)
            .map(|b| b.line_index)
            .collect()
    }
}

// ── Memoizing cache ─────────────────────────────────────────────────────────

/// Computed-once layouts keyed by record identity (name is unique per unit).
#[derive(Debug, Default)]
pub struct LayoutCache {
    line_bytes: u64,
    maps: HashMap<String, Rc<CacheLineMap>>,
}

impl LayoutCache {
    pub fn new(line_bytes: u64) -> Self {
        Self {
            line_bytes,
            maps: HashMap::new(),
        }
    }

    pub fn get_or_build(
        &mut self,
        record: &RecordDecl,
        tu: &TranslationUnit,
    ) -> Result<Rc<CacheLineMap>, LayoutError> {
        if let Some(map) = self.maps.get(&record.name) {
            return Ok(Rc::clone(map));
        }
        let map = Rc::new(CacheLineMap::build(record, tu, self.line_bytes)?);
        self.maps.insert(record.name.clone(), Rc::clone(&map));
        Ok(map)
    }
}
