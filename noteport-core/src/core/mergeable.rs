//! Decoding of "mergeable data": the versioned object-graph format used for
//! tables, URL cards and other rich attachments.
//!
//! The graph is an arena. Entries live in one flat vector and refer to each
//! other (and to three side tables of keys, type names and uuids) only by
//! position. Positions on the wire are 1-based; [`WireIndex`] is the only way
//! to turn one into an array position, so the conversion happens in exactly
//! one place. Decoding is a purely structural walk: nothing is resolved here.
//!
//! ```text
//! MergeableData   { 2: Object }
//! Object          { 2: version, 3: ObjectData }
//! ObjectData      { 3: Entry*, 4: key*, 5: type name*, 6: uuid* }
//! Entry           { 1: Register, 5: List, 6: Dictionary, 10: Note,
//!                   13: CustomMap, 16: OrderedSet }
//! ObjectRef       { 2: unsigned, 4: string, 6: object index }
//! CustomMap       { 1: type index, 3: MapEntry { 1: key index, 2: ObjectRef }* }
//! Dictionary      { 1: Element { 1: ObjectRef, 2: ObjectRef }* }
//! OrderedSet      { 1: Ordering { 1: Array { 1: Note, 2: Slot { 1: index, 2: uuid }* },
//!                                 2: Dictionary },
//!                   2: Dictionary }
//! ```

use crate::core::error::DecodeError;
use crate::core::note_body::{decode_note, first_message, AttachmentInfo, NoteText};
use crate::core::proto::fields;

const OBJECT_REPLACEMENT: &str = "\u{fffc}";

/// A 1-based position exactly as it appears on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WireIndex(u64);

impl WireIndex {
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn raw(self) -> u64 {
        self.0
    }

    /// Array position for this index, or `None` for the (invalid) zero index.
    pub fn to_zero_based(self) -> Option<usize> {
        self.0.checked_sub(1).and_then(|v| usize::try_from(v).ok())
    }
}

/// A 0-based position in [`ObjectGraph::entries`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectIndex(pub usize);

/// A 0-based position in [`ObjectGraph::uuids`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UuidIndex(pub usize);

/// A polymorphic reference value. Usually exactly one member is set.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ObjectRef {
    pub unsigned: Option<u64>,
    pub string: Option<String>,
    pub object: Option<WireIndex>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MapEntry {
    pub key: WireIndex,
    pub value: ObjectRef,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CustomMap {
    pub type_index: WireIndex,
    pub entries: Vec<MapEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Dictionary {
    pub elements: Vec<(ObjectRef, ObjectRef)>,
}

/// One slot of an ordered set's literal array.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderedSlot {
    pub index: i64,
    pub uuid: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct OrderedSet {
    /// The literal ordering, one slot per sequence position.
    pub array: Vec<OrderedSlot>,
    /// Aliases: maps an already-ordered id object to another id object.
    pub contents: Dictionary,
    pub elements: Dictionary,
}

/// A decoded graph entry.
#[derive(Debug, Clone, PartialEq)]
pub enum Entry {
    Note(NoteText),
    /// A note whose only content is one embedded attachment.
    AttachmentInfo(AttachmentInfo),
    CustomMap(CustomMap),
    OrderedSet(OrderedSet),
    Dictionary(Dictionary),
    List(Vec<ObjectRef>),
    Register(ObjectRef),
    /// A variant this decoder does not model; kept so positions stay aligned.
    Unknown,
}

/// Flat, index-addressed object graph.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ObjectGraph {
    pub version: i64,
    pub entries: Vec<Entry>,
    pub keys: Vec<String>,
    pub types: Vec<String>,
    pub uuids: Vec<Vec<u8>>,
}

impl ObjectGraph {
    pub fn entry(&self, index: ObjectIndex) -> Option<&Entry> {
        self.entries.get(index.0)
    }

    /// Follows a reference's object index, if it has one and it is in bounds.
    pub fn resolve(&self, reference: &ObjectRef) -> Option<(ObjectIndex, &Entry)> {
        let index = ObjectIndex(reference.object?.to_zero_based()?);
        self.entry(index).map(|entry| (index, entry))
    }

    pub fn key(&self, index: WireIndex) -> Option<&str> {
        self.keys.get(index.to_zero_based()?).map(String::as_str)
    }

    pub fn type_name(&self, index: WireIndex) -> Option<&str> {
        self.types.get(index.to_zero_based()?).map(String::as_str)
    }

    pub fn uuid(&self, index: UuidIndex) -> Option<&[u8]> {
        self.uuids.get(index.0).map(Vec::as_slice)
    }

    /// Position of `uuid` in the uuid side table.
    pub fn uuid_position(&self, uuid: &[u8]) -> Option<UuidIndex> {
        self.uuids.iter().position(|u| u == uuid).map(UuidIndex)
    }

    /// Converts a wire uuid reference into a side-table position, bounds-checked.
    pub fn uuid_index(&self, wire: WireIndex) -> Option<UuidIndex> {
        let index = wire.to_zero_based()?;
        (index < self.uuids.len()).then_some(UuidIndex(index))
    }

    /// First custom-map entry whose type name equals `type_name`.
    pub fn find_custom_map(&self, type_name: &str) -> Option<(ObjectIndex, &CustomMap)> {
        self.entries.iter().enumerate().find_map(|(i, entry)| match entry {
            Entry::CustomMap(map) if self.type_name(map.type_index) == Some(type_name) => {
                Some((ObjectIndex(i), map))
            }
            _ => None,
        })
    }

    /// Value stored under the key named `key` in `map`.
    pub fn map_value<'a>(&self, map: &'a CustomMap, key: &str) -> Option<&'a ObjectRef> {
        map.entries
            .iter()
            .find(|e| self.key(e.key) == Some(key))
            .map(|e| &e.value)
    }

    /// All string values held directly in registers, in entry order.
    pub fn register_strings(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().filter_map(|entry| match entry {
            Entry::Register(r) => r.string.as_deref(),
            _ => None,
        })
    }
}

/// Decodes a mergeable-data envelope into an [`ObjectGraph`].
pub fn decode_mergeable(bytes: &[u8]) -> Result<ObjectGraph, DecodeError> {
    let object = first_message(bytes, 2)?
        .ok_or_else(|| DecodeError::Malformed("mergeable data has no object".to_string()))?;

    let mut graph = ObjectGraph::default();
    let mut data = None;
    for field in fields(object) {
        let field = field?;
        match field.number {
            2 => graph.version = field.int()?,
            3 => data = Some(field.bytes()?),
            _ => {}
        }
    }
    let Some(data) = data else {
        return Ok(graph);
    };

    for field in fields(data) {
        let field = field?;
        match field.number {
            3 => graph.entries.push(decode_entry(field.bytes()?)?),
            4 => graph.keys.push(field.string()?),
            5 => graph.types.push(field.string()?),
            6 => graph.uuids.push(field.bytes()?.to_vec()),
            _ => {}
        }
    }
    Ok(graph)
}

fn decode_entry(bytes: &[u8]) -> Result<Entry, DecodeError> {
    let mut register = None;
    let mut entry = None;
    for field in fields(bytes) {
        let field = field?;
        let decoded = match field.number {
            1 => {
                register = first_message(field.bytes()?, 2)?.map(decode_ref).transpose()?;
                continue;
            }
            5 => Entry::List(decode_list(field.bytes()?)?),
            6 => Entry::Dictionary(decode_dictionary(field.bytes()?)?),
            10 => entry_from_note(decode_note(field.bytes()?)?),
            13 => Entry::CustomMap(decode_custom_map(field.bytes()?)?),
            16 => Entry::OrderedSet(decode_ordered_set(field.bytes()?)?),
            _ => continue,
        };
        entry.get_or_insert(decoded);
    }
    Ok(entry.or(register.map(Entry::Register)).unwrap_or(Entry::Unknown))
}

fn entry_from_note(note: NoteText) -> Entry {
    if note.text == OBJECT_REPLACEMENT && note.runs.len() == 1 {
        if let Some(info) = note.runs[0].attachment.clone() {
            return Entry::AttachmentInfo(info);
        }
    }
    Entry::Note(note)
}

fn decode_ref(bytes: &[u8]) -> Result<ObjectRef, DecodeError> {
    let mut r = ObjectRef::default();
    for field in fields(bytes) {
        let field = field?;
        match field.number {
            2 => r.unsigned = Some(field.uint()?),
            4 => r.string = Some(field.string()?),
            6 => r.object = Some(WireIndex::new(field.uint()?)),
            _ => {}
        }
    }
    Ok(r)
}

fn decode_list(bytes: &[u8]) -> Result<Vec<ObjectRef>, DecodeError> {
    let mut items = Vec::new();
    for field in fields(bytes) {
        let field = field?;
        if field.number == 1 {
            if let Some(id) = first_message(field.bytes()?, 2)? {
                items.push(decode_ref(id)?);
            }
        }
    }
    Ok(items)
}

fn decode_dictionary(bytes: &[u8]) -> Result<Dictionary, DecodeError> {
    let mut dict = Dictionary::default();
    for field in fields(bytes) {
        let field = field?;
        if field.number != 1 {
            continue;
        }
        let (mut key, mut value) = (None, None);
        for inner in fields(field.bytes()?) {
            let inner = inner?;
            match inner.number {
                1 => key = Some(decode_ref(inner.bytes()?)?),
                2 => value = Some(decode_ref(inner.bytes()?)?),
                _ => {}
            }
        }
        if let (Some(key), Some(value)) = (key, value) {
            dict.elements.push((key, value));
        }
    }
    Ok(dict)
}

fn decode_custom_map(bytes: &[u8]) -> Result<CustomMap, DecodeError> {
    let mut map = CustomMap { type_index: WireIndex::new(0), entries: Vec::new() };
    for field in fields(bytes) {
        let field = field?;
        match field.number {
            1 => map.type_index = WireIndex::new(field.uint()?),
            3 => {
                let mut key = None;
                let mut value = ObjectRef::default();
                for inner in fields(field.bytes()?) {
                    let inner = inner?;
                    match inner.number {
                        1 => key = Some(WireIndex::new(inner.uint()?)),
                        2 => value = decode_ref(inner.bytes()?)?,
                        _ => {}
                    }
                }
                if let Some(key) = key {
                    map.entries.push(MapEntry { key, value });
                }
            }
            _ => {}
        }
    }
    Ok(map)
}

fn decode_ordered_set(bytes: &[u8]) -> Result<OrderedSet, DecodeError> {
    let mut set = OrderedSet::default();
    for field in fields(bytes) {
        let field = field?;
        match field.number {
            1 => {
                for ordering in fields(field.bytes()?) {
                    let ordering = ordering?;
                    match ordering.number {
                        1 => set.array = decode_ordering_array(ordering.bytes()?)?,
                        2 => set.contents = decode_dictionary(ordering.bytes()?)?,
                        _ => {}
                    }
                }
            }
            2 => set.elements = decode_dictionary(field.bytes()?)?,
            _ => {}
        }
    }
    Ok(set)
}

fn decode_ordering_array(bytes: &[u8]) -> Result<Vec<OrderedSlot>, DecodeError> {
    let mut slots = Vec::new();
    for field in fields(bytes) {
        let field = field?;
        if field.number != 2 {
            continue;
        }
        let mut slot = OrderedSlot { index: 0, uuid: Vec::new() };
        for inner in fields(field.bytes()?) {
            let inner = inner?;
            match inner.number {
                1 => slot.index = inner.int()?,
                2 => slot.uuid = inner.bytes()?.to_vec(),
                _ => {}
            }
        }
        slots.push(slot);
    }
    Ok(slots)
}

/// Builders for hand-written graph fixtures.
#[cfg(test)]
pub(crate) mod fixtures {
    use crate::core::proto::encode::Message;

    pub fn object_ref(object: u64) -> Message {
        Message::new().varint(6, object)
    }

    pub fn unsigned_ref(value: u64) -> Message {
        Message::new().varint(2, value)
    }

    pub fn string_ref(value: &str) -> Message {
        Message::new().string(4, value)
    }

    /// `(key index, value ref)` pairs; indices are 1-based wire values.
    pub fn custom_map(type_index: u64, entries: Vec<(u64, Message)>) -> Message {
        let map = entries.into_iter().fold(Message::new().varint(1, type_index), |m, (k, v)| {
            m.message(3, Message::new().varint(1, k).message(2, v))
        });
        Message::new().message(13, map)
    }

    pub fn dictionary_body(pairs: Vec<(u64, u64)>) -> Message {
        pairs.into_iter().fold(Message::new(), |m, (k, v)| {
            m.message(1, Message::new().message(1, object_ref(k)).message(2, object_ref(v)))
        })
    }

    pub fn dictionary(pairs: Vec<(u64, u64)>) -> Message {
        Message::new().message(6, dictionary_body(pairs))
    }

    /// Ordered set over literal uuids plus `(key object, alias object)` pairs.
    pub fn ordered_set(uuids: Vec<Vec<u8>>, aliases: Vec<(u64, u64)>) -> Message {
        let array = uuids
            .into_iter()
            .enumerate()
            .fold(Message::new().message(1, Message::new()), |m, (i, u)| {
                m.message(2, Message::new().varint(1, i as u64).bytes(2, &u))
            });
        let ordering = Message::new().message(1, array).message(2, dictionary_body(aliases));
        Message::new().message(16, Message::new().message(1, ordering).message(2, Message::new()))
    }

    pub fn register(value: Message) -> Message {
        Message::new().message(1, Message::new().message(2, value))
    }

    pub fn note_entry(text: &str) -> Message {
        Message::new().message(10, Message::new().string(2, text))
    }

    pub fn graph(
        entries: Vec<Message>,
        keys: &[&str],
        types: &[&str],
        uuids: &[Vec<u8>],
    ) -> Vec<u8> {
        let mut data = entries.into_iter().fold(Message::new(), |m, e| m.message(3, e));
        for k in keys {
            data = data.string(4, k);
        }
        for t in types {
            data = data.string(5, t);
        }
        for u in uuids {
            data = data.bytes(6, u);
        }
        Message::new()
            .message(2, Message::new().varint(2, 1).message(3, data))
            .finish()
    }
}
