//! The optional per-segment index of contributing records (spec.md component G).
//!
//! Populated only when the caller asks (`RECORD_LIST` flag): a debugging and
//! lazy-decode aid, not an owner of payload. Entries reference external bytes
//! by one of three location hints and are resolved back to decoded samples on
//! demand by [`unpack_recordlist`].
use std::collections::HashMap;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::sync::{Arc, Mutex};

use crate::codec::{RecordCodec, RecordDescriptor, SampleBuffer, SampleType, SourceId};
use crate::errors::MstlError;
use crate::slab::Slab;
use crate::time::MsTime;

/// Where the encoded bytes of one record-list entry actually live.
#[derive(Clone)]
pub enum RecordLocation {
    /// An in-memory buffer the caller keeps alive for at least as long as the entry.
    Buffer(Arc<[u8]>),
    /// An already-open file handle, read at a byte offset.
    OpenFile(Arc<Mutex<File>>),
    /// A file name, opened (and cached) lazily by [`unpack_recordlist`].
    FileName(Arc<str>),
}

/// Where one record's encoded bytes came from, supplied by the caller alongside
/// a `RecordDescriptor` whenever the `RECORD_LIST` flag is in effect (spec.md
/// section 6). The merge engine threads this through `add_record` so a
/// newly-created, appended, or prepended segment's record list references the
/// real bytes rather than a placeholder.
#[derive(Clone)]
pub struct RecordOrigin {
    pub location: RecordLocation,
    pub data_offset: usize,
    pub data_size: usize,
}

/// Where in the record to add a new entry (spec.md glossary "Whence").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Whence {
    NewList,
    End,
    Start,
}

/// One contributing record, as referenced from a segment's record list.
#[derive(Clone)]
pub struct RecordListEntry {
    pub sid: SourceId,
    pub pubversion: u8,
    pub starttime: MsTime,
    pub endtime: MsTime,
    pub samprate: f64,
    pub encoding: u8,
    pub location: RecordLocation,
    pub data_offset: usize,
    pub data_size: usize,
    pub private_ptr: Option<i64>,
    next: Option<usize>,
    prev: Option<usize>,
}

/// An ordered list of [`RecordListEntry`] values for one segment.
#[derive(Default, Clone)]
pub struct RecordList {
    entries: Slab<RecordListEntry>,
    head: Option<usize>,
    tail: Option<usize>,
    count: usize,
}

impl RecordList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Appends (or prepends) `entry` according to `whence`. `NewList` and `End`
    /// behave the same on an already-nonempty list (both append); `NewList` only
    /// matters semantically as "this is the first entry of a fresh segment".
    pub fn push(&mut self, whence: Whence, mut entry: RecordListEntry) {
        match whence {
            Whence::NewList | Whence::End => {
                entry.prev = self.tail;
                entry.next = None;
                let idx = self.entries.insert(entry);
                if let Some(tail) = self.tail {
                    self.entries.get_mut(tail).expect("tail exists").next = Some(idx);
                } else {
                    self.head = Some(idx);
                }
                self.tail = Some(idx);
            }
            Whence::Start => {
                entry.prev = None;
                entry.next = self.head;
                let idx = self.entries.insert(entry);
                if let Some(head) = self.head {
                    self.entries.get_mut(head).expect("head exists").prev = Some(idx);
                } else {
                    self.tail = Some(idx);
                }
                self.head = Some(idx);
            }
        }
        self.count += 1;
    }

    /// Appends every entry of `other` after this list's tail, consuming `other`.
    /// Used by `Segment::absorb` when healing two segments together.
    pub fn absorb(&mut self, other: RecordList) {
        for (_, entry) in other.iter_owned() {
            self.push(Whence::End, entry);
        }
    }

    pub fn iter(&self) -> RecordListIter<'_> {
        RecordListIter {
            list: self,
            cursor: self.head,
        }
    }

    fn iter_owned(self) -> Vec<(usize, RecordListEntry)> {
        let mut out = Vec::with_capacity(self.count);
        let mut cursor = self.head;
        let mut entries = self.entries;
        while let Some(idx) = cursor {
            let entry = entries.remove(idx).expect("linked entry exists");
            cursor = entry.next;
            out.push((idx, entry));
        }
        out
    }
}

pub struct RecordListIter<'a> {
    list: &'a RecordList,
    cursor: Option<usize>,
}

impl<'a> Iterator for RecordListIter<'a> {
    type Item = &'a RecordListEntry;

    fn next(&mut self) -> Option<Self::Item> {
        let idx = self.cursor?;
        let entry = self.list.entries.get(idx).expect("linked entry exists");
        self.cursor = entry.next;
        Some(entry)
    }
}

impl RecordListEntry {
    pub fn new(
        sid: SourceId,
        pubversion: u8,
        starttime: MsTime,
        endtime: MsTime,
        samprate: f64,
        encoding: u8,
        location: RecordLocation,
        data_offset: usize,
        data_size: usize,
        private_ptr: Option<i64>,
    ) -> Self {
        RecordListEntry {
            sid,
            pubversion,
            starttime,
            endtime,
            samprate,
            encoding,
            location,
            data_offset,
            data_size,
            private_ptr,
            next: None,
            prev: None,
        }
    }

    /// Builds an entry from a record descriptor and the caller-supplied origin
    /// of its encoded bytes (spec.md component G).
    pub fn from_record(rec: &RecordDescriptor, endtime: MsTime, origin: &RecordOrigin) -> Self {
        RecordListEntry::new(
            rec.sid.clone(),
            rec.pubversion,
            rec.starttime,
            endtime,
            rec.samprate,
            rec.encoding,
            origin.location.clone(),
            origin.data_offset,
            origin.data_size,
            None,
        )
    }
}

/// Walks `list` in order, resolving each entry's bytes via its location hint and
/// appending decoded samples into `out` (a caller-supplied `SampleBuffer` of the
/// expected total length). Fails with [`MstlError::Invariant`] if entries disagree
/// on sample type/encoding size; fails with [`MstlError::Io`] on a file error.
///
/// `file_cache` is a per-call cache of already-opened file-name entries, so that
/// a segment whose record list references one file by name repeatedly does not
/// reopen it for every entry.
pub fn unpack_recordlist<C: RecordCodec>(
    list: &RecordList,
    codec: &C,
    swapflag: bool,
    file_cache: &mut HashMap<String, File>,
    out: &mut SampleBuffer,
) -> Result<i64, MstlError> {
    let mut expected_type: Option<SampleType> = None;
    let mut total_decoded = 0i64;

    for entry in list.iter() {
        let (_size, sample_type) = codec.encoding_sizetype(entry.encoding)?;
        match expected_type {
            None => expected_type = Some(sample_type),
            Some(t) if t == sample_type => {}
            Some(t) => {
                return Err(MstlError::Invariant {
                    msg: format!(
                        "record list entries disagree on sample type: {:?} vs {:?}",
                        t, sample_type
                    ),
                })
            }
        }

        let bytes = resolve_bytes(entry, file_cache)?;
        let count = codec.decode_samples(&bytes, entry.encoding, -1, out, swapflag, &entry.sid)?;
        total_decoded += count;
    }

    Ok(total_decoded)
}

fn resolve_bytes(entry: &RecordListEntry, file_cache: &mut HashMap<String, File>) -> Result<Vec<u8>, MstlError> {
    let mut buf = vec![0u8; entry.data_size];
    match &entry.location {
        RecordLocation::Buffer(bytes) => {
            let start = entry.data_offset;
            let end = start + entry.data_size;
            buf.copy_from_slice(&bytes[start..end]);
        }
        RecordLocation::OpenFile(file) => {
            let mut f = file.lock().expect("record-list file mutex poisoned");
            f.seek(SeekFrom::Start(entry.data_offset as u64))?;
            f.read_exact(&mut buf)?;
        }
        RecordLocation::FileName(name) => {
            if !file_cache.contains_key(name.as_ref()) {
                let f = File::open(name.as_ref())?;
                file_cache.insert(name.to_string(), f);
            }
            let f = file_cache.get_mut(name.as_ref()).expect("just inserted");
            f.seek(SeekFrom::Start(entry.data_offset as u64))?;
            f.read_exact(&mut buf)?;
        }
    }
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn push_new_list_then_end_preserves_order() {
        let mut list = RecordList::new();
        let mk = |st: MsTime, et: MsTime| {
            RecordListEntry::new(
                SourceId::new("FDSN:NET_STA__B_H_Z").unwrap(),
                1,
                st,
                et,
                100.0,
                11,
                RecordLocation::Buffer(Arc::from(vec![0u8; 16].into_boxed_slice())),
                0,
                16,
                None,
            )
        };
        list.push(Whence::NewList, mk(0, 10));
        list.push(Whence::End, mk(10, 20));
        let starts: Vec<MsTime> = list.iter().map(|e| e.starttime).collect();
        assert_eq!(starts, vec![0, 10]);
    }

    #[test]
    fn push_start_prepends() {
        let mut list = RecordList::new();
        let mk = |st: MsTime| {
            RecordListEntry::new(
                SourceId::new("X").unwrap(),
                1,
                st,
                st + 1,
                100.0,
                11,
                RecordLocation::Buffer(Arc::from(vec![0u8; 4].into_boxed_slice())),
                0,
                4,
                None,
            )
        };
        list.push(Whence::NewList, mk(10));
        list.push(Whence::Start, mk(0));
        let starts: Vec<MsTime> = list.iter().map(|e| e.starttime).collect();
        assert_eq!(starts, vec![0, 10]);
    }

    /// A tiny fixed-width i32 codec, used only to exercise [`unpack_recordlist`]'s
    /// three location hints without a real Steim/CRC implementation.
    struct RawI32Codec;

    impl RecordCodec for RawI32Codec {
        fn parse(&self, _buffer: &[u8], _flags: u32) -> Result<(crate::codec::ParseOutcome, usize), MstlError> {
            unimplemented!("unpack_recordlist never calls parse")
        }

        fn data_bounds(&self, _encoding: u8, reclen: u32) -> (usize, usize) {
            (0, reclen as usize)
        }

        fn encoding_sizetype(&self, encoding: u8) -> Result<(usize, SampleType), MstlError> {
            match encoding {
                11 => Ok((4, SampleType::I32)),
                99 => Ok((4, SampleType::F32)),
                other => Err(MstlError::UnknownSampleType { encoding: other }),
            }
        }

        fn decode_samples(
            &self,
            bytes: &[u8],
            _encoding: u8,
            _count: i64,
            out: &mut SampleBuffer,
            _swapflag: bool,
            _sid: &SourceId,
        ) -> Result<i64, MstlError> {
            let SampleBuffer::I32(v) = out else {
                return Err(MstlError::UnknownSampleType { encoding: 11 });
            };
            let mut n = 0i64;
            for chunk in bytes.chunks_exact(4) {
                v.push(i32::from_be_bytes(chunk.try_into().unwrap()));
                n += 1;
            }
            Ok(n)
        }
    }

    fn entry_at(location: RecordLocation, offset: usize, size: usize, start: MsTime) -> RecordListEntry {
        RecordListEntry::new(
            SourceId::new("FDSN:NET_STA__B_H_Z").unwrap(),
            1,
            start,
            start + 1,
            100.0,
            11,
            location,
            offset,
            size,
            None,
        )
    }

    #[test]
    fn unpack_recordlist_resolves_buffer_entries() {
        let bytes: Vec<u8> = vec![1i32, 2, 3]
            .into_iter()
            .flat_map(|s| s.to_be_bytes())
            .collect();
        let mut list = RecordList::new();
        list.push(
            Whence::NewList,
            entry_at(RecordLocation::Buffer(Arc::from(bytes.into_boxed_slice())), 0, 12, 0),
        );

        let mut out = SampleBuffer::I32(Vec::new());
        let mut cache = HashMap::new();
        let n = unpack_recordlist(&list, &RawI32Codec, false, &mut cache, &mut out).unwrap();
        assert_eq!(n, 3);
        assert_eq!(out, SampleBuffer::I32(vec![1, 2, 3]));
    }

    #[test]
    fn unpack_recordlist_resolves_open_file_and_filename_entries() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        let payload: Vec<u8> = vec![4i32, 5].into_iter().flat_map(|s| s.to_be_bytes()).collect();
        tmp.write_all(&payload).unwrap();
        let path = tmp.path().to_str().unwrap().to_string();

        let mut list = RecordList::new();
        list.push(
            Whence::NewList,
            entry_at(RecordLocation::FileName(Arc::from(path.as_str())), 0, 8, 0),
        );
        let reopened = std::fs::File::open(&path).unwrap();
        list.push(
            Whence::End,
            entry_at(RecordLocation::OpenFile(Arc::new(Mutex::new(reopened))), 4, 4, 1),
        );

        let mut out = SampleBuffer::I32(Vec::new());
        let mut cache = HashMap::new();
        let n = unpack_recordlist(&list, &RawI32Codec, false, &mut cache, &mut out).unwrap();
        assert_eq!(n, 3, "one full entry (2 samples) plus one partial entry (1 sample)");
        assert_eq!(out, SampleBuffer::I32(vec![4, 5, 5]));
        assert!(cache.contains_key(&path), "filename entries populate the file cache");
    }

    #[test]
    fn unpack_recordlist_rejects_mismatched_encodings() {
        let mut list = RecordList::new();
        list.push(
            Whence::NewList,
            entry_at(RecordLocation::Buffer(Arc::from(vec![0u8; 4].into_boxed_slice())), 0, 4, 0),
        );
        let mut mismatched = entry_at(RecordLocation::Buffer(Arc::from(vec![0u8; 4].into_boxed_slice())), 0, 4, 1);
        mismatched.encoding = 99;
        list.push(Whence::End, mismatched);

        let mut out = SampleBuffer::I32(Vec::new());
        let mut cache = HashMap::new();
        let err = unpack_recordlist(&list, &RawI32Codec, false, &mut cache, &mut out).unwrap_err();
        assert!(matches!(err, MstlError::Invariant { .. }));
    }
}
