//! Line iteration over mapped bytes.
//!
//! Lines are split on `\n`. The terminator is not part of the line, but a
//! `\r` in front of it is. Content after the last terminator is yielded as a
//! final line; nothing is yielded after a trailing terminator.

use std::borrow::Cow;
use std::fmt;

use crate::map::MapRef;

/// One line, aliasing the mapped memory.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Line<'a> {
    bytes: &'a [u8],
    index: usize,
    offset: usize,
}

impl<'a> Line<'a> {
    pub fn as_bytes(&self) -> &'a [u8] {
        self.bytes
    }

    /// 1-based line number.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Length in bytes, without the terminator.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Offset of the first byte, relative to the start of the region.
    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn to_str_lossy(&self) -> Cow<'a, str> {
        String::from_utf8_lossy(self.bytes)
    }
}

impl fmt::Debug for Line<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Line")
            .field("index", &self.index)
            .field("text", &self.to_str_lossy())
            .finish()
    }
}

/// Cursor state shared by [`Lines`] and [`MapLines`].
#[derive(Clone, Debug, Default)]
struct Cursor {
    pos: usize,
    index: usize,
}

impl Cursor {
    fn next<'a>(&mut self, bytes: &'a [u8]) -> Option<Line<'a>> {
        let rest = bytes.get(self.pos..).filter(|rest| !rest.is_empty())?;
        let start = self.pos;
        let (line, consumed) = match rest.iter().position(|&b| b == b'\n') {
            Some(end) => (&rest[..end], end + 1),
            None => (rest, rest.len()),
        };
        self.pos += consumed;
        self.index += 1;
        Some(Line {
            bytes: line,
            index: self.index,
            offset: start,
        })
    }
}

/// Lines of a byte slice, typically a [`MapRef`].
///
/// Dropping the iterator leaves the region mapped.
#[derive(Clone, Debug)]
pub struct Lines<'a> {
    bytes: &'a [u8],
    cursor: Cursor,
}

impl<'a> Lines<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self {
            bytes,
            cursor: Cursor::default(),
        }
    }
}

impl<'a> Iterator for Lines<'a> {
    type Item = Line<'a>;

    fn next(&mut self) -> Option<Line<'a>> {
        self.cursor.next(self.bytes)
    }
}

impl std::iter::FusedIterator for Lines<'_> {}

/// A line cursor that owns its region.
///
/// Each line is only valid until the next call to [`MapLines::advance`];
/// the region is unmapped when the cursor is dropped.
#[derive(Debug)]
pub struct MapLines<'h> {
    map: MapRef<'h>,
    cursor: Cursor,
}

impl<'h> MapLines<'h> {
    pub(crate) fn new(map: MapRef<'h>) -> Self {
        Self {
            map,
            cursor: Cursor::default(),
        }
    }

    pub fn advance(&mut self) -> Option<Line<'_>> {
        self.cursor.next(self.map.as_bytes())
    }

    /// The region being walked.
    pub fn map(&self) -> &MapRef<'h> {
        &self.map
    }

    /// Give the region back, ending the walk.
    pub fn into_map(self) -> MapRef<'h> {
        self.map
    }
}
