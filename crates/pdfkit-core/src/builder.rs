//! Document-building capability
//!
//! The assembler only knows the [`DocumentBuilder`] trait. [`LopdfBuilder`]
//! is the lopdf-backed implementation: it starts from an empty page tree and
//! grows it one input at a time.

use lopdf::content::{Content, Operation};
use lopdf::{Dictionary, Document, Object, ObjectId, Stream};
use serde::{Deserialize, Serialize};

use crate::error::BuildError;
use crate::image::{embed_jpeg, embed_png, fit_and_center};
use crate::input::ImageFormat;

/// Page attributes a page may inherit from its ancestors in the page tree
const INHERITABLE_KEYS: [&[u8]; 4] = [b"MediaBox", b"CropBox", b"Resources", b"Rotate"];

/// Guard against cyclic `/Parent` chains in malformed files
const MAX_TREE_DEPTH: usize = 64;

pub trait DocumentBuilder {
    /// Copy every page of a PDF into the output, in order. Returns the number
    /// of pages appended.
    fn append_as_pages(&mut self, bytes: &[u8]) -> Result<usize, BuildError>;

    /// Add one new page holding the image, scaled to fit and centered
    fn append_as_image_page(&mut self, bytes: &[u8], format: ImageFormat)
        -> Result<(), BuildError>;

    fn page_count(&self) -> usize;

    /// Write out the accumulated document
    fn serialize(self) -> Result<Vec<u8>, BuildError>;
}

/// Page dimensions in points
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PageSize {
    pub width: f32,
    pub height: f32,
}

impl PageSize {
    pub const LETTER: PageSize = PageSize {
        width: 612.0,
        height: 792.0,
    };
    pub const A4: PageSize = PageSize {
        width: 595.28,
        height: 841.89,
    };
}

impl Default for PageSize {
    fn default() -> Self {
        PageSize::LETTER
    }
}

pub struct LopdfBuilder {
    doc: Document,
    pages_id: ObjectId,
    page_refs: Vec<ObjectId>,
    page_size: PageSize,
}

impl Default for LopdfBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl LopdfBuilder {
    /// Empty document with Letter-sized image pages
    pub fn new() -> Self {
        Self::with_page_size(PageSize::default())
    }

    pub fn with_page_size(page_size: PageSize) -> Self {
        let mut doc = Document::with_version("1.7");
        let pages_id = doc.new_object_id();

        let mut pages_dict = Dictionary::new();
        pages_dict.set("Type", Object::Name(b"Pages".to_vec()));
        pages_dict.set("Kids", Object::Array(vec![]));
        pages_dict.set("Count", Object::Integer(0));
        doc.objects.insert(pages_id, Object::Dictionary(pages_dict));

        let mut catalog_dict = Dictionary::new();
        catalog_dict.set("Type", Object::Name(b"Catalog".to_vec()));
        catalog_dict.set("Pages", Object::Reference(pages_id));
        let catalog_id = doc.add_object(Object::Dictionary(catalog_dict));

        doc.trailer.set("Root", Object::Reference(catalog_id));

        Self {
            doc,
            pages_id,
            page_refs: Vec::new(),
            page_size,
        }
    }

    pub fn page_size(&self) -> PageSize {
        self.page_size
    }

    /// Write the current page list into the page tree root
    fn sync_page_tree(&mut self) -> Result<(), BuildError> {
        match self.doc.objects.get_mut(&self.pages_id) {
            Some(Object::Dictionary(pages_dict)) => {
                let kids = self
                    .page_refs
                    .iter()
                    .map(|&id| Object::Reference(id))
                    .collect::<Vec<_>>();
                pages_dict.set("Kids", Object::Array(kids));
                pages_dict.set("Count", Object::Integer(self.page_refs.len() as i64));
                Ok(())
            }
            _ => Err(BuildError::OperationError(
                "Invalid pages dictionary".into(),
            )),
        }
    }
}

impl DocumentBuilder for LopdfBuilder {
    /// Object IDs of the source are shifted past the destination's highest ID
    /// so both sets can live in one object table. Inherited page attributes
    /// are copied onto each page before it is reparented, since the source's
    /// intermediate page tree nodes are no longer its ancestors.
    fn append_as_pages(&mut self, bytes: &[u8]) -> Result<usize, BuildError> {
        let source =
            Document::load_mem(bytes).map_err(|e| BuildError::ParseError(e.to_string()))?;

        if source.is_encrypted() {
            return Err(BuildError::Encrypted);
        }

        let source_pages: Vec<ObjectId> = source.get_pages().into_values().collect();
        if source_pages.is_empty() {
            return Err(BuildError::NoPages);
        }

        let inherited: Vec<Vec<(Vec<u8>, Object)>> = source_pages
            .iter()
            .map(|&page_id| inherited_attributes(&source, page_id))
            .collect();

        let id_offset = self.doc.max_id;
        let source_max_id = source.max_id;

        for (old_id, mut object) in source.objects.into_iter() {
            shift_refs(&mut object, id_offset);
            self.doc
                .objects
                .insert((old_id.0 + id_offset, old_id.1), object);
        }

        for (old_page_id, attributes) in source_pages.iter().zip(inherited) {
            let new_page_id = (old_page_id.0 + id_offset, old_page_id.1);

            match self.doc.objects.get_mut(&new_page_id) {
                Some(Object::Dictionary(page_dict)) => {
                    for (key, mut value) in attributes {
                        if !page_dict.has(&key) {
                            shift_refs(&mut value, id_offset);
                            page_dict.set(key, value);
                        }
                    }
                    page_dict.set("Parent", Object::Reference(self.pages_id));
                }
                _ => {
                    return Err(BuildError::OperationError(format!(
                        "Page object {} {} is not a dictionary",
                        old_page_id.0, old_page_id.1
                    )))
                }
            }

            self.page_refs.push(new_page_id);
        }

        self.doc.max_id = self.doc.max_id.max(source_max_id + id_offset);
        self.sync_page_tree()?;

        Ok(source_pages.len())
    }

    fn append_as_image_page(
        &mut self,
        bytes: &[u8],
        format: ImageFormat,
    ) -> Result<(), BuildError> {
        let image = match format {
            ImageFormat::Jpeg => embed_jpeg(bytes)?,
            ImageFormat::Png => embed_png(bytes)?,
        };

        let placement = fit_and_center(image.width as f32, image.height as f32, self.page_size);

        let mut image_stream = image.stream;
        if let Some(mask) = image.soft_mask {
            let mask_id = self.doc.add_object(Object::Stream(mask));
            image_stream.dict.set("SMask", Object::Reference(mask_id));
        }
        let image_id = self.doc.add_object(Object::Stream(image_stream));

        let content = Content {
            operations: vec![
                Operation::new("q", vec![]),
                Operation::new(
                    "cm",
                    vec![
                        Object::Real(placement.width),
                        Object::Integer(0),
                        Object::Integer(0),
                        Object::Real(placement.height),
                        Object::Real(placement.x),
                        Object::Real(placement.y),
                    ],
                ),
                Operation::new("Do", vec![Object::Name(b"Im0".to_vec())]),
                Operation::new("Q", vec![]),
            ],
        };
        let encoded = content
            .encode()
            .map_err(|e| BuildError::OperationError(format!("Failed to encode page: {}", e)))?;
        let content_id = self
            .doc
            .add_object(Object::Stream(Stream::new(Dictionary::new(), encoded)));

        let mut xobjects = Dictionary::new();
        xobjects.set("Im0", Object::Reference(image_id));
        let mut resources = Dictionary::new();
        resources.set("XObject", Object::Dictionary(xobjects));

        let mut page_dict = Dictionary::new();
        page_dict.set("Type", Object::Name(b"Page".to_vec()));
        page_dict.set("Parent", Object::Reference(self.pages_id));
        page_dict.set(
            "MediaBox",
            Object::Array(vec![
                Object::Integer(0),
                Object::Integer(0),
                Object::Real(self.page_size.width),
                Object::Real(self.page_size.height),
            ]),
        );
        page_dict.set("Resources", Object::Dictionary(resources));
        page_dict.set("Contents", Object::Reference(content_id));

        let page_id = self.doc.add_object(Object::Dictionary(page_dict));
        self.page_refs.push(page_id);
        self.sync_page_tree()
    }

    fn page_count(&self) -> usize {
        self.page_refs.len()
    }

    fn serialize(mut self) -> Result<Vec<u8>, BuildError> {
        self.sync_page_tree()?;
        // drop the catalogs and page tree roots left behind by merged inputs
        self.doc.prune_objects();
        self.doc.compress();

        let mut buffer = Vec::new();
        self.doc
            .save_to(&mut buffer)
            .map_err(|e| BuildError::SerializationError(format!("Failed to save PDF: {}", e)))?;

        Ok(buffer)
    }
}

/// Inheritable attributes a page does not set itself, taken from the nearest
/// ancestor that does
fn inherited_attributes(doc: &Document, page_id: ObjectId) -> Vec<(Vec<u8>, Object)> {
    let Ok(page) = doc.get_dictionary(page_id) else {
        return Vec::new();
    };

    let mut found = Vec::new();
    for key in INHERITABLE_KEYS {
        if page.has(key) {
            continue;
        }

        let mut parent = page.get(b"Parent").and_then(Object::as_reference).ok();
        let mut depth = 0;
        while let Some(parent_id) = parent {
            if depth >= MAX_TREE_DEPTH {
                break;
            }
            let Ok(node) = doc.get_dictionary(parent_id) else {
                break;
            };
            if let Ok(value) = node.get(key) {
                found.push((key.to_vec(), value.clone()));
                break;
            }
            parent = node.get(b"Parent").and_then(Object::as_reference).ok();
            depth += 1;
        }
    }
    found
}

/// Move every reference inside `obj` past the IDs the output already uses
fn shift_refs(obj: &mut Object, offset: u32) {
    let dict = match obj {
        Object::Reference(id) => {
            id.0 += offset;
            return;
        }
        Object::Array(items) => {
            items.iter_mut().for_each(|item| shift_refs(item, offset));
            return;
        }
        Object::Dictionary(dict) => dict,
        Object::Stream(stream) => &mut stream.dict,
        _ => return,
    };
    for (_, value) in dict.iter_mut() {
        shift_refs(value, offset);
    }
}
