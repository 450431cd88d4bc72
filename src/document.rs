//! The object store.
//!
//! A [`Document`] owns every indirect object of one PDF in an arena keyed
//! by [`ObjectRef`], together with the trailer entries that survive a
//! rewrite (`/Root`, `/Info`, `/ID`) and the document's encryption state.
//! Arena order is parse order (file offset order) followed by allocation
//! order; the serializer writes objects in that order.
//!
//! Loading is eager: after the cross-reference index is read (or rebuilt
//! by scanning), every object is parsed, decrypted when possible and
//! object streams are expanded into ordinary arena entries.

use crate::encryption::{EncryptionHandler, SecurityState};
use crate::error::{Error, Result};
use crate::object::{Dict, Object, ObjectRef};
use crate::objstm::parse_object_stream;
use crate::parser::parse_indirect_object;
use crate::parser_config::ParserOptions;
use crate::xref::{find_startxref, parse_xref_chain, CrossRefTable, XRefEntry};
use crate::xref_reconstruction::reconstruct_xref;
use bytes::Bytes;
use indexmap::IndexMap;
use md5::{Digest, Md5};
use std::cell::RefCell;
use std::collections::HashMap;
use std::path::Path;

/// How far into the file the `%PDF-` marker may appear.
const HEADER_WINDOW: usize = 1024;

/// Largest object number accepted from input or handed out by
/// [`Document::allocate`], the implementation limit of ISO 32000-1 Annex C.
pub const MAX_OBJECT_NUMBER: u32 = 8_388_607;

static NULL_OBJECT: Object = Object::Null;

/// Encryption state of a document.
#[derive(Debug, Clone)]
pub enum EncryptionState {
    /// Not encrypted
    Plain,
    /// Encrypted and no valid password supplied yet; strings and streams
    /// are still ciphertext and object streams are not expanded.
    Locked(Box<LockedState>),
    /// Encrypted, with the key known; contents are plaintext in memory and
    /// are encrypted again on serialization.
    Unlocked(Box<SecurityState>),
}

/// What is needed to finish loading a locked document.
#[derive(Debug, Clone)]
pub struct LockedState {
    handler: EncryptionHandler,
    /// object number -> containing object stream, from the xref index
    compressed: HashMap<u32, u32>,
}

/// An in-memory PDF document.
#[derive(Debug, Clone)]
pub struct Document {
    version: (u8, u8),
    objects: IndexMap<ObjectRef, Object>,
    trailer: Dict,
    next_object_number: u32,
    encryption: EncryptionState,
    decoded_cache: RefCell<HashMap<ObjectRef, Bytes>>,
    options: ParserOptions,
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl Document {
    fn empty(version: (u8, u8), options: ParserOptions) -> Self {
        Self {
            version,
            objects: IndexMap::new(),
            trailer: Dict::new(),
            next_object_number: 1,
            encryption: EncryptionState::Plain,
            decoded_cache: RefCell::new(HashMap::new()),
            options,
        }
    }

    /// A new document with an empty page tree.
    ///
    /// Objects: `1 0` catalog, `2 0` page tree root, `3 0` info dictionary.
    /// The file identifier is derived from a random UUID.
    pub fn new() -> Self {
        let mut doc = Self::empty((1, 7), ParserOptions::default());

        let catalog_ref = doc.allocate();
        let pages_ref = doc.allocate();
        let info_ref = doc.allocate();

        let mut pages = Dict::new();
        pages.insert("Type".to_string(), Object::name("Pages"));
        pages.insert("Kids".to_string(), Object::Array(Vec::new()));
        pages.insert("Count".to_string(), Object::Integer(0));

        let mut catalog = Dict::new();
        catalog.insert("Type".to_string(), Object::name("Catalog"));
        catalog.insert("Pages".to_string(), Object::Reference(pages_ref));

        let mut info = Dict::new();
        info.insert(
            "Producer".to_string(),
            Object::string(format!("{} {}", crate::NAME, crate::VERSION)),
        );
        info.insert(
            "CreationDate".to_string(),
            Object::string(chrono::Utc::now().format("D:%Y%m%d%H%M%SZ").to_string()),
        );

        doc.put(catalog_ref, Object::Dictionary(catalog));
        doc.put(pages_ref, Object::Dictionary(pages));
        doc.put(info_ref, Object::Dictionary(info));

        doc.trailer.insert("Root".to_string(), Object::Reference(catalog_ref));
        doc.trailer.insert("Info".to_string(), Object::Reference(info_ref));
        let id = Md5::digest(uuid::Uuid::new_v4().as_bytes()).to_vec();
        doc.set_file_id(id);
        doc
    }

    /// Parse a document with lenient options.
    pub fn parse(data: &[u8]) -> Result<Self> {
        Self::parse_with_options(data, ParserOptions::default())
    }

    /// Read and parse a file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        Self::load_with_options(path, ParserOptions::default())
    }

    /// Read and parse a file with explicit options.
    pub fn load_with_options(path: impl AsRef<Path>, options: ParserOptions) -> Result<Self> {
        let data = std::fs::read(path.as_ref())?;
        Self::parse_with_options(&data, options)
    }

    /// Parse a document.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidHeader`] when `%PDF-` is not within the first 1024 bytes
    /// - [`Error::ParseError`] when the cross-reference index is unusable in
    ///   strict mode, or nothing resembling objects is found in lenient mode
    /// - [`Error::UnsupportedEncryption`] for security handlers other than Standard
    pub fn parse_with_options(data: &[u8], options: ParserOptions) -> Result<Self> {
        if options.max_file_size > 0 && data.len() > options.max_file_size {
            return Err(Error::ParseError {
                offset: 0,
                reason: format!(
                    "input of {} bytes exceeds limit of {}",
                    data.len(),
                    options.max_file_size
                ),
            });
        }

        let version = parse_header(data)?;
        let table = load_xref(data, &options)?;
        let mut doc = Self::empty(version, options);

        doc.load_objects(data, &table)?;
        doc.drop_out_of_range_numbers();
        doc.resolve_indirect_lengths();

        let mut trailer = table.trailer().clone();
        doc.repair_root(&mut trailer)?;

        let compressed: HashMap<u32, u32> = table
            .iter()
            .filter_map(|(num, e)| match e {
                XRefEntry::Compressed { stream, .. } => Some((num, stream)),
                _ => None,
            })
            .collect();

        let file_id = first_id(&trailer).unwrap_or_else(|| {
            log::warn!("Trailer has no /ID; deriving one from the file contents");
            Md5::digest(data).to_vec()
        });
        doc.trailer = ["Root", "Info"]
            .iter()
            .filter_map(|k| trailer.get(*k).map(|v| (k.to_string(), v.clone())))
            .collect();
        doc.set_file_id_pair(trailer.get("ID").cloned(), file_id.clone());

        let size = trailer
            .get("Size")
            .and_then(|o| o.as_integer())
            .and_then(|n| u32::try_from(n).ok())
            .filter(|&n| {
                let sane = n <= MAX_OBJECT_NUMBER + 1;
                if !sane {
                    log::warn!("Ignoring trailer /Size {} beyond the object number limit", n);
                }
                sane
            })
            .unwrap_or(0);

        match trailer.get("Encrypt").cloned() {
            None => doc.expand_object_streams(&compressed)?,
            Some(encrypt) => {
                let encrypt_dict = match &encrypt {
                    Object::Reference(r) => doc.objects.shift_remove(r).and_then(|o| match o {
                        Object::Dictionary(d) => Some(d),
                        _ => None,
                    }),
                    Object::Dictionary(d) => Some(d.clone()),
                    _ => None,
                }
                .ok_or_else(|| Error::InvalidPdf("/Encrypt is not a dictionary".to_string()))?;

                let handler = EncryptionHandler::new(&encrypt_dict, file_id)?;
                doc.encryption = EncryptionState::Locked(Box::new(LockedState {
                    handler,
                    compressed,
                }));
                match doc.unlock(b"") {
                    Ok(()) => log::info!("Opened encrypted document with an empty user password"),
                    Err(Error::InvalidPassword(_)) => {
                        log::info!("Document is password protected; contents stay locked")
                    },
                    Err(e) => return Err(e),
                }
            },
        }

        doc.next_object_number = size.max(1);
        doc.advance_past_existing();

        log::debug!(
            "Loaded PDF {}.{} with {} objects",
            doc.version.0,
            doc.version.1,
            doc.objects.len()
        );
        Ok(doc)
    }

    fn load_objects(&mut self, data: &[u8], table: &CrossRefTable) -> Result<()> {
        let mut direct: Vec<(u32, usize)> = table
            .iter()
            .filter_map(|(num, e)| match e {
                XRefEntry::InUse { offset, .. } if num > 0 => Some((num, offset)),
                _ => None,
            })
            .collect();
        direct.sort_by_key(|&(_, offset)| offset);

        for (num, offset) in direct {
            let parsed = data
                .get(offset..)
                .ok_or_else(|| format!("offset {} beyond end of file", offset))
                .and_then(|slice| {
                    parse_indirect_object(slice, self.options.max_nesting)
                        .map_err(|e| format!("{:?}", e))
                });
            match parsed {
                Ok((_, (id, obj))) => {
                    if id.num != num {
                        log::warn!("Index entry {} points at object {}; using {}", num, id.num, num);
                    }
                    self.objects.insert(ObjectRef::new(num, id.gen), obj);
                },
                Err(reason) if self.options.skip_invalid_objects => {
                    log::warn!("Skipping object {} at byte {}: {}", num, offset, reason);
                },
                Err(reason) => return Err(Error::ParseError { offset, reason }),
            }
        }
        Ok(())
    }

    /// Trim stream data to an indirect `/Length` once all objects are loaded.
    fn resolve_indirect_lengths(&mut self) {
        let fixes: Vec<(ObjectRef, usize)> = self
            .objects
            .iter()
            .filter_map(|(id, obj)| match obj {
                Object::Stream { dict, data } => {
                    let len_ref = dict.get("Length")?.as_reference()?;
                    let len = self.objects.get(&len_ref)?.as_integer()?;
                    let len = usize::try_from(len).ok()?;
                    (len < data.len()).then_some((*id, len))
                },
                _ => None,
            })
            .collect();

        for (id, len) in fixes {
            if let Some(Object::Stream { dict, data }) = self.objects.get_mut(&id) {
                *data = data.slice(..len);
                dict.insert("Length".to_string(), Object::Integer(len as i64));
            }
        }
    }

    /// Make sure the trailer `/Root` names a dictionary, falling back to the first catalog.
    fn repair_root(&self, trailer: &mut Dict) -> Result<()> {
        let root_ok = trailer
            .get("Root")
            .and_then(|o| o.as_reference())
            .and_then(|r| self.objects.get(&r))
            .is_some_and(|o| o.as_dict().is_some());
        if root_ok {
            return Ok(());
        }
        let catalog = self
            .objects
            .iter()
            .find(|(_, o)| o.dict_type() == Some("Catalog"))
            .map(|(r, _)| *r)
            .ok_or_else(|| Error::ParseError {
                offset: 0,
                reason: "no document catalog found".to_string(),
            })?;
        log::warn!("Trailer /Root is missing or broken; using catalog {}", catalog);
        trailer.insert("Root".to_string(), Object::Reference(catalog));
        Ok(())
    }

    /// Expand `/Type /ObjStm` containers into the arena and drop containers
    /// and cross-reference streams.
    ///
    /// With index information an object is taken only from the stream the
    /// index names; without it (rebuilt index) a member never replaces a
    /// directly stored object.
    fn expand_object_streams(&mut self, compressed: &HashMap<u32, u32>) -> Result<()> {
        let containers: Vec<ObjectRef> = self
            .objects
            .iter()
            .filter(|(_, o)| o.dict_type() == Some("ObjStm"))
            .map(|(r, _)| *r)
            .collect();

        let limits = self.options.decode_limits();
        for container in &containers {
            let Some(stream) = self.objects.get(container) else {
                continue;
            };
            let decoded = stream.decode_stream_data_with_limits(&limits)?;
            let Some(dict) = stream.as_dict() else {
                continue;
            };
            let members = parse_object_stream(dict, &decoded, self.options.max_nesting)?;
            for (num, obj) in members {
                if num > MAX_OBJECT_NUMBER {
                    log::warn!("Skipping object {} in stream {} beyond the number limit", num, container);
                    continue;
                }
                let id = ObjectRef::new(num, 0);
                let wanted = match compressed.get(&num) {
                    Some(stream_num) => *stream_num == container.num,
                    None => compressed.is_empty() && !self.objects.contains_key(&id),
                };
                if wanted {
                    self.objects.insert(id, obj);
                }
            }
        }

        let before = self.objects.len();
        self.objects
            .retain(|_, o| !matches!(o.dict_type(), Some("ObjStm") | Some("XRef")));
        if !containers.is_empty() {
            log::debug!(
                "Expanded {} object streams ({} container objects dropped)",
                containers.len(),
                before - self.objects.len()
            );
        }
        Ok(())
    }

    /// PDF version from the header.
    pub fn version(&self) -> (u8, u8) {
        self.version
    }

    /// Set the header version.
    pub fn set_version(&mut self, version: (u8, u8)) {
        self.version = version;
    }

    /// Parser options the document was loaded with.
    pub fn options(&self) -> &ParserOptions {
        &self.options
    }

    /// Trailer entries kept for rewriting (`/Root`, `/Info`, `/ID`).
    pub fn trailer(&self) -> &Dict {
        &self.trailer
    }

    /// Mutable trailer.
    pub fn trailer_mut(&mut self) -> &mut Dict {
        &mut self.trailer
    }

    /// Look up an object; `BrokenReference` when it is not in the store.
    pub fn resolve(&self, r: ObjectRef) -> Result<&Object> {
        self.objects
            .get(&r)
            .ok_or_else(|| Error::broken(r, "object not in document"))
    }

    /// Look up an object.
    pub fn get(&self, r: ObjectRef) -> Option<&Object> {
        self.objects.get(&r)
    }

    /// Mutable access to an object. Drops its cached decoded data.
    pub fn get_mut(&mut self, r: ObjectRef) -> Option<&mut Object> {
        self.decoded_cache.get_mut().remove(&r);
        self.objects.get_mut(&r)
    }

    /// Mutable access to a dictionary (or stream dictionary) object.
    pub fn get_dict_mut(&mut self, r: ObjectRef) -> Result<&mut Dict> {
        let obj = self
            .get_mut(r)
            .ok_or_else(|| Error::broken(r, "object not in document"))?;
        let found = obj.type_name();
        obj.as_dict_mut()
            .ok_or_else(|| Error::wrong_type("Dictionary", found))
    }

    /// Follow a chain of references to a direct value.
    ///
    /// A dangling reference reads as null. Chains longer than the
    /// configured recursion depth (including cycles) are an error.
    pub fn deref<'a>(&'a self, obj: &'a Object) -> Result<&'a Object> {
        let mut current = obj;
        let mut depth = 0;
        while let Object::Reference(r) = current {
            depth += 1;
            if depth > self.options.max_recursion_depth {
                return Err(Error::RecursionLimitExceeded(self.options.max_recursion_depth));
            }
            current = match self.objects.get(r) {
                Some(next) => next,
                None => {
                    log::debug!("Dangling reference {} reads as null", r);
                    return Ok(&NULL_OBJECT);
                },
            };
        }
        Ok(current)
    }

    /// Dereferenced dictionary entry, if present.
    pub fn dict_get<'a>(&'a self, dict: &'a Dict, key: &str) -> Result<Option<&'a Object>> {
        match dict.get(key) {
            Some(v) => {
                let v = self.deref(v)?;
                Ok((!v.is_null()).then_some(v))
            },
            None => Ok(None),
        }
    }

    /// Reserve the next object number.
    ///
    /// Parsed documents start below [`MAX_OBJECT_NUMBER`]; the counter
    /// saturates instead of wrapping.
    pub fn allocate(&mut self) -> ObjectRef {
        let r = ObjectRef::new(self.next_object_number, 0);
        self.next_object_number = self.next_object_number.saturating_add(1);
        r
    }

    /// Insert or replace an object. Replacing keeps its arena position.
    pub fn put(&mut self, r: ObjectRef, obj: Object) {
        self.decoded_cache.get_mut().remove(&r);
        if r.num >= self.next_object_number {
            self.next_object_number = r.num.saturating_add(1);
        }
        self.objects.insert(r, obj);
    }

    /// Discard objects numbered beyond [`MAX_OBJECT_NUMBER`].
    fn drop_out_of_range_numbers(&mut self) {
        let before = self.objects.len();
        self.objects.retain(|r, _| r.num <= MAX_OBJECT_NUMBER);
        let dropped = before - self.objects.len();
        if dropped > 0 {
            log::warn!("Dropped {} objects numbered beyond {}", dropped, MAX_OBJECT_NUMBER);
        }
    }

    /// Make sure the next allocation is above every stored object.
    fn advance_past_existing(&mut self) {
        if let Some(highest) = self.objects.keys().map(|r| r.num).max() {
            self.next_object_number = self.next_object_number.max(highest.saturating_add(1));
        }
    }

    /// Allocate a number for `obj` and store it.
    pub fn add_object(&mut self, obj: Object) -> ObjectRef {
        let r = self.allocate();
        self.put(r, obj);
        r
    }

    /// Remove an object from the arena.
    pub fn remove(&mut self, r: ObjectRef) -> Option<Object> {
        self.decoded_cache.get_mut().remove(&r);
        self.objects.shift_remove(&r)
    }

    /// Number the next [`allocate`](Self::allocate) will hand out.
    pub fn next_object_number(&self) -> u32 {
        self.next_object_number
    }

    /// Object identities in arena order.
    pub fn object_refs(&self) -> Vec<ObjectRef> {
        self.objects.keys().copied().collect()
    }

    /// Objects in arena order.
    pub fn iter(&self) -> impl Iterator<Item = (ObjectRef, &Object)> {
        self.objects.iter().map(|(r, o)| (*r, o))
    }

    /// Mutable objects in arena order. Clears the decoded-stream cache.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (ObjectRef, &mut Object)> {
        self.decoded_cache.get_mut().clear();
        self.objects.iter_mut().map(|(r, o)| (*r, o))
    }

    /// Number of objects in the arena.
    pub fn object_count(&self) -> usize {
        self.objects.len()
    }

    /// Decoded data of a stream object, cached until the object is mutated.
    pub fn decoded_stream(&self, r: ObjectRef) -> Result<Bytes> {
        if let Some(hit) = self.decoded_cache.borrow().get(&r) {
            return Ok(hit.clone());
        }
        let obj = self.resolve(r)?;
        let decoded = Bytes::from(
            obj.decode_stream_data_with_limits(&self.options.decode_limits())?,
        );
        self.decoded_cache.borrow_mut().insert(r, decoded.clone());
        Ok(decoded)
    }

    /// Reference to the document catalog.
    pub fn catalog_ref(&self) -> Result<ObjectRef> {
        self.trailer
            .get("Root")
            .and_then(|o| o.as_reference())
            .ok_or_else(|| Error::InvalidPdf("trailer has no /Root reference".to_string()))
    }

    /// The document catalog.
    pub fn catalog(&self) -> Result<&Dict> {
        let r = self.catalog_ref()?;
        let obj = self.resolve(r)?;
        obj.as_dict()
            .ok_or_else(|| Error::broken(r, "catalog is not a dictionary"))
    }

    /// Reference to the page tree root. Missing or non-dictionary roots are
    /// a `BrokenReference`.
    pub fn pages_root(&self) -> Result<ObjectRef> {
        let catalog_ref = self.catalog_ref()?;
        let catalog = self.catalog()?;
        let r = catalog
            .get("Pages")
            .and_then(|o| o.as_reference())
            .ok_or_else(|| Error::broken(catalog_ref, "catalog has no /Pages reference"))?;
        match self.objects.get(&r) {
            Some(o) if o.as_dict().is_some() => Ok(r),
            Some(_) => Err(Error::broken(r, "page tree root is not a dictionary")),
            None => Err(Error::broken(r, "page tree root is missing")),
        }
    }

    /// Reference to the info dictionary, if any.
    pub fn info_ref(&self) -> Option<ObjectRef> {
        self.trailer.get("Info").and_then(|o| o.as_reference())
    }

    /// The info dictionary, if any.
    pub fn info(&self) -> Option<&Dict> {
        self.objects.get(&self.info_ref()?)?.as_dict()
    }

    /// Set or replace one info entry, creating the dictionary if needed.
    pub fn set_info(&mut self, key: &str, value: Object) {
        let r = match self.info_ref().filter(|r| self.objects.contains_key(r)) {
            Some(r) => r,
            None => {
                let r = self.add_object(Object::Dictionary(Dict::new()));
                self.trailer.insert("Info".to_string(), Object::Reference(r));
                r
            },
        };
        if let Some(d) = self.get_mut(r).and_then(|o| o.as_dict_mut()) {
            d.insert(key.to_string(), value);
        }
    }

    /// First element of the file identifier.
    pub fn file_id(&self) -> Option<&[u8]> {
        match self.trailer.get("ID")? {
            Object::Array(ids) => ids.first()?.as_string(),
            _ => None,
        }
    }

    /// Set both halves of `/ID` to `id`.
    pub fn set_file_id(&mut self, id: Vec<u8>) {
        self.trailer.insert(
            "ID".to_string(),
            Object::Array(vec![Object::String(id.clone()), Object::String(id)]),
        );
    }

    fn set_file_id_pair(&mut self, original: Option<Object>, first: Vec<u8>) {
        let second = match &original {
            Some(Object::Array(ids)) => ids.get(1).and_then(|o| o.as_string()).map(|s| s.to_vec()),
            _ => None,
        };
        let second = second.unwrap_or_else(|| first.clone());
        self.trailer.insert(
            "ID".to_string(),
            Object::Array(vec![Object::String(first), Object::String(second)]),
        );
    }

    /// Current encryption state.
    pub fn encryption(&self) -> &EncryptionState {
        &self.encryption
    }

    /// Unlocked security parameters, used when serializing.
    pub fn security(&self) -> Option<&SecurityState> {
        match &self.encryption {
            EncryptionState::Unlocked(state) => Some(state),
            _ => None,
        }
    }

    /// True for encrypted documents, locked or not.
    pub fn is_encrypted(&self) -> bool {
        !matches!(self.encryption, EncryptionState::Plain)
    }

    /// True while no valid password has been supplied.
    pub fn is_locked(&self) -> bool {
        matches!(self.encryption, EncryptionState::Locked(_))
    }

    /// `InvalidPassword` if the document is locked.
    pub fn ensure_unlocked(&self) -> Result<()> {
        if self.is_locked() {
            return Err(Error::InvalidPassword(
                "document is encrypted; a password is required".to_string(),
            ));
        }
        Ok(())
    }

    /// Decrypt a locked document in memory. Unlocked and plain documents
    /// are left as they are.
    pub fn unlock(&mut self, password: &[u8]) -> Result<()> {
        let EncryptionState::Locked(locked) = &self.encryption else {
            return Ok(());
        };
        let state = locked.handler.unlock(password)?;
        let compressed = locked.compressed.clone();

        for (id, obj) in self.objects.iter_mut() {
            if obj.dict_type() == Some("XRef") {
                continue;
            }
            state.decrypt_object(*id, obj)?;
        }
        self.decoded_cache.get_mut().clear();
        self.encryption = EncryptionState::Unlocked(Box::new(state));
        self.expand_object_streams(&compressed)?;
        self.advance_past_existing();
        Ok(())
    }

    /// Check `password` against the document's encryption parameters.
    pub fn verify_password(&self, password: &[u8]) -> Result<()> {
        let handler = match &self.encryption {
            EncryptionState::Plain => return Ok(()),
            EncryptionState::Locked(locked) => locked.handler.clone(),
            EncryptionState::Unlocked(state) => EncryptionHandler::new(
                &state.encrypt_dict,
                self.file_id().unwrap_or_default().to_vec(),
            )?,
        };
        handler
            .authenticate(password)
            .map(|_| ())
            .ok_or_else(|| Error::InvalidPassword("password does not match".to_string()))
    }

    /// Encrypt on the next serialization with `state`.
    pub fn set_security(&mut self, state: SecurityState) {
        self.encryption = EncryptionState::Unlocked(Box::new(state));
    }

    /// Drop encryption; the next serialization writes plaintext.
    /// A locked document cannot be cleared.
    pub fn clear_security(&mut self) -> Result<()> {
        self.ensure_unlocked()?;
        self.encryption = EncryptionState::Plain;
        Ok(())
    }
}

/// Locate `%PDF-M.m` within the first 1024 bytes.
pub fn parse_header(data: &[u8]) -> Result<(u8, u8)> {
    let window = &data[..data.len().min(HEADER_WINDOW)];
    let pos = window
        .windows(5)
        .position(|w| w == b"%PDF-")
        .ok_or_else(|| {
            Error::InvalidHeader(
                String::from_utf8_lossy(&window[..window.len().min(8)]).into_owned(),
            )
        })?;
    if pos > 0 {
        log::warn!("PDF header found at byte {} instead of 0", pos);
    }

    let version = &data[pos + 5..];
    match version {
        [major, b'.', minor, ..] if major.is_ascii_digit() && minor.is_ascii_digit() => {
            Ok((major - b'0', minor - b'0'))
        },
        _ => {
            log::warn!("Unreadable PDF version after header; assuming 1.4");
            Ok((1, 4))
        },
    }
}

/// Read the cross-reference chain, rebuilding it by scanning when it is
/// unusable and `strict` is off.
fn load_xref(data: &[u8], options: &ParserOptions) -> Result<CrossRefTable> {
    let parsed = find_startxref(data)
        .and_then(|offset| parse_xref_chain(data, offset, options.max_recursion_depth))
        .and_then(|table| match table.validate(data) {
            Ok(()) => Ok(table),
            Err(reason) => Err(Error::ParseError { offset: 0, reason }),
        });

    match parsed {
        Ok(table) => Ok(table),
        Err(e) if options.strict => Err(e),
        Err(e) => {
            log::warn!("Cross-reference index unusable ({}); scanning the file", e);
            reconstruct_xref(data, options.max_nesting)
        },
    }
}

fn first_id(trailer: &Dict) -> Option<Vec<u8>> {
    match trailer.get("ID")? {
        Object::Array(ids) => ids
            .first()?
            .as_string()
            .filter(|s| !s.is_empty())
            .map(|s| s.to_vec()),
        _ => None,
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Assemble a classic PDF from object bodies numbered 1..=n.
    pub(crate) fn build_pdf(bodies: &[&str], trailer_extra: &str) -> Vec<u8> {
        let mut out = b"%PDF-1.4\n".to_vec();
        let mut offsets = Vec::new();
        for (i, body) in bodies.iter().enumerate() {
            offsets.push(out.len());
            out.extend_from_slice(format!("{} 0 obj\n{}\nendobj\n", i + 1, body).as_bytes());
        }
        let xref = out.len();
        out.extend_from_slice(format!("xref\n0 {}\n0000000000 65535 f \n", bodies.len() + 1).as_bytes());
        for off in offsets {
            out.extend_from_slice(format!("{:010} 00000 n \n", off).as_bytes());
        }
        out.extend_from_slice(
            format!(
                "trailer\n<< /Size {} /Root 1 0 R {} >>\nstartxref\n{}\n%%EOF\n",
                bodies.len() + 1,
                trailer_extra,
                xref
            )
            .as_bytes(),
        );
        out
    }

    fn two_page_pdf() -> Vec<u8> {
        build_pdf(
            &[
                "<< /Type /Catalog /Pages 2 0 R >>",
                "<< /Type /Pages /Kids [3 0 R 4 0 R] /Count 2 >>",
                "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] >>",
                "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] >>",
            ],
            "",
        )
    }

    #[test]
    fn test_new_document_structure() {
        let doc = Document::new();
        assert_eq!(doc.version(), (1, 7));
        let root = doc.pages_root().unwrap();
        let pages = doc.resolve(root).unwrap();
        assert_eq!(pages.dict_type(), Some("Pages"));
        assert!(doc.info().unwrap().contains_key("Producer"));
        assert!(doc.info().unwrap().contains_key("CreationDate"));
        assert_eq!(doc.file_id().map(|id| id.len()), Some(16));
        assert_eq!(doc.next_object_number(), 4);
    }

    #[test]
    fn test_new_documents_get_distinct_ids() {
        assert_ne!(Document::new().file_id(), Document::new().file_id());
    }

    #[test]
    fn test_parse_simple() {
        let doc = Document::parse(&two_page_pdf()).unwrap();
        assert_eq!(doc.version(), (1, 4));
        assert_eq!(doc.object_count(), 4);
        assert_eq!(doc.catalog_ref().unwrap(), ObjectRef::new(1, 0));
        assert_eq!(doc.pages_root().unwrap(), ObjectRef::new(2, 0));
        assert_eq!(doc.next_object_number(), 5);
        assert!(!doc.is_encrypted());
    }

    #[test]
    fn test_missing_id_derived_from_content() {
        let data = two_page_pdf();
        let doc = Document::parse(&data).unwrap();
        assert_eq!(doc.file_id().unwrap(), &Md5::digest(&data)[..]);
    }

    #[test]
    fn test_invalid_header() {
        let err = Document::parse(b"not a pdf file at all").unwrap_err();
        assert!(matches!(err, Error::InvalidHeader(_)));
    }

    #[test]
    fn test_header_after_garbage() {
        let mut data = b"garbage\n".to_vec();
        data.extend(two_page_pdf());
        // offsets are now off by 8 bytes, so the scan takes over
        let doc = Document::parse(&data).unwrap();
        assert_eq!(doc.object_count(), 4);
    }

    #[test]
    fn test_stale_xref_recovered_by_scan() {
        let mut data = two_page_pdf();
        let pos = data.windows(10).position(|w| w == b"0000000009").unwrap();
        data[pos..pos + 10].copy_from_slice(b"0000000002");
        let doc = Document::parse(&data).unwrap();
        assert_eq!(doc.pages_root().unwrap(), ObjectRef::new(2, 0));
    }

    #[test]
    fn test_strict_mode_rejects_stale_xref() {
        let mut data = two_page_pdf();
        let pos = data.windows(10).position(|w| w == b"0000000009").unwrap();
        data[pos..pos + 10].copy_from_slice(b"0000000002");
        let err = Document::parse_with_options(&data, ParserOptions::strict()).unwrap_err();
        assert!(matches!(err, Error::ParseError { .. }));
    }

    #[test]
    fn test_missing_startxref_recovered() {
        let data = two_page_pdf();
        let cut = data.windows(9).rposition(|w| w == b"startxref").unwrap();
        let doc = Document::parse(&data[..cut]).unwrap();
        assert_eq!(doc.object_count(), 4);
    }

    #[test]
    fn test_indirect_length_trims_stream() {
        let data = build_pdf(
            &[
                "<< /Type /Catalog /Pages 2 0 R >>",
                "<< /Type /Pages /Kids [] /Count 0 >>",
                "<< /Length 4 0 R >>\nstream\nabcdefgh\nendstream",
                "5",
            ],
            "",
        );
        let doc = Document::parse(&data).unwrap();
        match doc.resolve(ObjectRef::new(3, 0)).unwrap() {
            Object::Stream { data, dict } => {
                assert_eq!(&data[..], b"abcde");
                assert_eq!(dict.get("Length"), Some(&Object::Integer(5)));
            },
            other => panic!("expected stream, got {:?}", other),
        }
    }

    #[test]
    fn test_object_stream_expanded() {
        let header = "5 0 6 6 ";
        let body = format!("{}(abc) << /K 1 >>", header);
        let objstm = format!(
            "<< /Type /ObjStm /N 2 /First {} /Length {} >>\nstream\n{}\nendstream",
            header.len(),
            body.len(),
            body
        );
        let data = build_pdf(
            &[
                "<< /Type /Catalog /Pages 2 0 R >>",
                "<< /Type /Pages /Kids [] /Count 0 >>",
                &objstm,
            ],
            "",
        );
        let doc = Document::parse(&data).unwrap();
        assert_eq!(
            doc.get(ObjectRef::new(5, 0)),
            Some(&Object::String(b"abc".to_vec()))
        );
        assert!(doc.get(ObjectRef::new(6, 0)).unwrap().as_dict().is_some());
        // the container itself is gone
        assert!(doc.get(ObjectRef::new(3, 0)).is_none());
        assert_eq!(doc.next_object_number(), 7);
    }

    #[test]
    fn test_missing_root_falls_back_to_catalog() {
        let mut data = two_page_pdf();
        let pos = data.windows(10).position(|w| w == b"/Root 1 0 ").unwrap();
        data[pos..pos + 10].copy_from_slice(b"/Root 9 0 ");
        let doc = Document::parse(&data).unwrap();
        assert_eq!(doc.catalog_ref().unwrap(), ObjectRef::new(1, 0));
    }

    #[test]
    fn test_missing_pages_root_is_broken_reference() {
        let data = build_pdf(&["<< /Type /Catalog /Pages 7 0 R >>"], "");
        let doc = Document::parse(&data).unwrap();
        let err = doc.pages_root().unwrap_err();
        assert_eq!(err.object(), Some(ObjectRef::new(7, 0)));
    }

    #[test]
    fn test_deref_chain_and_cycle() {
        let mut doc = Document::new();
        let a = doc.allocate();
        let b = doc.allocate();
        doc.put(a, Object::Reference(b));
        doc.put(b, Object::Integer(9));
        assert_eq!(doc.deref(&Object::Reference(a)).unwrap(), &Object::Integer(9));

        doc.put(b, Object::Reference(a));
        assert!(matches!(
            doc.deref(&Object::Reference(a)),
            Err(Error::RecursionLimitExceeded(_))
        ));

        let dangling = Object::Reference(ObjectRef::new(999, 0));
        assert!(doc.deref(&dangling).unwrap().is_null());
        assert!(doc.resolve(ObjectRef::new(999, 0)).is_err());
    }

    #[test]
    fn test_put_keeps_arena_position() {
        let mut doc = Document::new();
        let refs = doc.object_refs();
        doc.put(refs[0], Object::Integer(1));
        assert_eq!(doc.object_refs(), refs);
        let added = doc.add_object(Object::Null);
        assert_eq!(doc.object_refs().last(), Some(&added));
    }

    #[test]
    fn test_put_bumps_next_number() {
        let mut doc = Document::new();
        doc.put(ObjectRef::new(40, 0), Object::Null);
        assert_eq!(doc.allocate(), ObjectRef::new(41, 0));
    }

    #[test]
    fn test_decoded_stream_cache_invalidated() {
        let mut doc = Document::new();
        let r = doc.add_object(Object::stream(Dict::new(), b"one".to_vec()));
        assert_eq!(&doc.decoded_stream(r).unwrap()[..], b"one");
        if let Some(Object::Stream { data, .. }) = doc.get_mut(r) {
            *data = Bytes::from_static(b"two");
        }
        assert_eq!(&doc.decoded_stream(r).unwrap()[..], b"two");
    }

    #[test]
    fn test_set_info_creates_dictionary() {
        let mut doc = Document::new();
        doc.trailer_mut().remove("Info");
        doc.set_info("Title", Object::string("Report"));
        assert_eq!(
            doc.info().and_then(|d| d.get("Title")),
            Some(&Object::string("Report"))
        );
    }

    #[test]
    fn test_parse_header_versions() {
        assert_eq!(parse_header(b"%PDF-1.7\n").unwrap(), (1, 7));
        assert_eq!(parse_header(b"%PDF-2.0\n").unwrap(), (2, 0));
        assert_eq!(parse_header(b"%PDF-x\n").unwrap(), (1, 4));
        assert!(parse_header(b"%PD").is_err());
    }

    #[test]
    fn test_load_nonexistent_file() {
        let err = Document::load("/nonexistent/path/to/file.pdf").unwrap_err();
        assert!(matches!(err, Error::Io(_)));
    }

    mod numbering_tests {
        use super::*;

        fn with_size(size: &str) -> Vec<u8> {
            String::from_utf8(two_page_pdf())
                .unwrap()
                .replace("/Size 5 ", &format!("/Size {} ", size))
                .into_bytes()
        }

        #[test]
        fn test_trailer_size_raises_next_number() {
            let doc = Document::parse(&with_size("12")).unwrap();
            assert_eq!(doc.next_object_number(), 12);
        }

        #[test]
        fn test_absurd_trailer_size_ignored() {
            for size in ["4294967295", "99999999999", "-3"] {
                let mut doc = Document::parse(&with_size(size)).unwrap();
                assert_eq!(doc.next_object_number(), 5, "/Size {}", size);
                let r = doc.add_object(Object::Integer(1));
                assert_eq!(r, ObjectRef::new(5, 0));
            }
        }

        #[test]
        fn test_put_at_top_of_range_does_not_overflow() {
            let mut doc = Document::new();
            doc.put(ObjectRef::new(u32::MAX, 0), Object::Null);
            assert_eq!(doc.next_object_number(), u32::MAX);
            assert_eq!(doc.allocate().num, u32::MAX);
        }
    }
}
