//! Page-wise PDF concatenation on top of `lopdf`.

use lopdf::{Dictionary, Document, Object, ObjectId, dictionary};

use crate::application::render::{DocumentMerger, MergeError};

/// Page attributes a page may inherit from its ancestors in the page tree.
const INHERITABLE: [&[u8]; 4] = [b"MediaBox", b"CropBox", b"Resources", b"Rotate"];
const MAX_TREE_DEPTH: usize = 64;

/// Merges documents by grafting every source page under one new page tree.
#[derive(Debug, Clone, Copy, Default)]
pub struct LopdfMerger;

impl DocumentMerger for LopdfMerger {
    fn merge(&self, documents: &[Vec<u8>]) -> Result<Vec<u8>, MergeError> {
        let mut merged = Document::with_version("1.7");
        let mut page_ids = Vec::new();

        for (index, bytes) in documents.iter().enumerate() {
            let position = index + 1;
            let source = Document::load_mem(bytes).map_err(|err| MergeError::Parse {
                position,
                message: err.to_string(),
            })?;
            if source.is_encrypted() {
                return Err(MergeError::Encrypted { position });
            }
            let imported = import_pages(&mut merged, source);
            if imported.is_empty() {
                return Err(MergeError::Parse {
                    position,
                    message: "document has no pages".to_string(),
                });
            }
            page_ids.extend(imported);
        }

        let pages_id = merged.new_object_id();
        for &page_id in &page_ids {
            let inherited = inherited_attributes(&merged, page_id);
            if let Ok(page) = merged
                .get_object_mut(page_id)
                .and_then(Object::as_dict_mut)
            {
                for (key, value) in inherited {
                    page.set(key.to_vec(), value);
                }
                page.set("Parent", pages_id);
            }
        }

        let kids: Vec<Object> = page_ids.iter().copied().map(Object::Reference).collect();
        merged.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => page_ids.len() as i64,
            }),
        );
        let catalog_id = merged.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        merged.trailer.set("Root", catalog_id);
        merged.prune_objects();
        merged.renumber_objects();

        let mut output = Vec::new();
        merged
            .save_to(&mut output)
            .map_err(|err| MergeError::Write {
                message: err.to_string(),
            })?;
        Ok(output)
    }
}

/// Move every object of `source` into `target`, returning its pages in order.
fn import_pages(target: &mut Document, mut source: Document) -> Vec<ObjectId> {
    source.renumber_objects_with(target.max_id + 1);
    let page_ids: Vec<ObjectId> = source.get_pages().into_values().collect();
    if source.max_id > target.max_id {
        target.max_id = source.max_id;
    }
    target.objects.extend(source.objects);
    page_ids
}

/// Attributes the page lacks but an ancestor supplies, nearest ancestor first.
fn inherited_attributes(doc: &Document, page_id: ObjectId) -> Vec<(&'static [u8], Object)> {
    let mut found: Vec<(&'static [u8], Object)> = Vec::new();
    let Ok(page) = doc.get_dictionary(page_id) else {
        return found;
    };

    let mut parent = parent_of(page);
    let mut depth = 0;
    while let Some(node_id) = parent {
        depth += 1;
        if depth > MAX_TREE_DEPTH {
            break;
        }
        let Ok(node) = doc.get_dictionary(node_id) else {
            break;
        };
        for key in INHERITABLE {
            if page.has(key) || found.iter().any(|(existing, _)| *existing == key) {
                continue;
            }
            if let Ok(value) = node.get(key) {
                found.push((key, value.clone()));
            }
        }
        parent = parent_of(node);
    }
    found
}

fn parent_of(node: &Dictionary) -> Option<ObjectId> {
    node.get(b"Parent").and_then(Object::as_reference).ok()
}
