//! Page scanning
//!
//! Lists the image XObjects each page draws from, following inherited
//! resources and nested Form XObjects.

use std::collections::HashSet;

use lopdf::{Dictionary, Object, ObjectId};

use crate::document::{DocumentStore, MAX_RESOLVE_DEPTH};

/// Walks page resources for image references
pub struct ImageEnumerator<'a> {
    store: &'a DocumentStore,
}

impl<'a> ImageEnumerator<'a> {
    pub fn new(store: &'a DocumentStore) -> Self {
        Self { store }
    }

    /// Image object ids used by a page, in the order its resources declare
    /// them. An id appears at most once per page; pages sharing an image each
    /// list it.
    pub fn images_on_page(&self, page_id: ObjectId) -> Vec<ObjectId> {
        let mut images = Vec::new();
        let mut seen = HashSet::new();

        let Ok(Object::Dictionary(page_dict)) = self.store.document().get_object(page_id) else {
            log::debug!("Page {:?} is not a dictionary", page_id);
            return images;
        };

        if let Some(resources) = self.page_resources(page_dict) {
            self.collect_from_resources(resources, &mut images, &mut seen);
        }

        images
    }

    /// Resources of a page, inherited from the nearest ancestor when absent
    fn page_resources(&self, page_dict: &'a Dictionary) -> Option<&'a Object> {
        let doc = self.store.document();
        let mut current = page_dict;
        for _ in 0..MAX_RESOLVE_DEPTH {
            if let Ok(resources) = current.get(b"Resources") {
                return Some(resources);
            }
            let parent_id = current.get(b"Parent").ok()?.as_reference().ok()?;
            current = doc.get_object(parent_id).ok()?.as_dict().ok()?;
        }
        None
    }

    fn collect_from_resources(
        &self,
        resources: &'a Object,
        images: &mut Vec<ObjectId>,
        seen: &mut HashSet<ObjectId>,
    ) {
        let xobjects = match self.store.resolve(resources) {
            Some(Object::Dictionary(res)) => res.get(b"XObject").ok(),
            _ => None,
        };
        let Some(Object::Dictionary(xobjects)) = xobjects.and_then(|x| self.store.resolve(x)) else {
            return;
        };

        for (name, value) in xobjects.iter() {
            match value {
                Object::Reference(id) => self.collect_recursive(*id, images, seen),
                _ => log::debug!(
                    "XObject /{} is not an indirect reference",
                    String::from_utf8_lossy(name)
                ),
            }
        }
    }

    fn collect_recursive(
        &self,
        id: ObjectId,
        images: &mut Vec<ObjectId>,
        seen: &mut HashSet<ObjectId>,
    ) {
        if !seen.insert(id) {
            return;
        }

        let stream = match self.store.document().get_object(id) {
            Ok(Object::Stream(stream)) => stream,
            _ => {
                log::debug!("XObject {:?} does not resolve to a stream", id);
                return;
            }
        };

        match stream.dict.get(b"Subtype").and_then(Object::as_name) {
            Ok(b"Image") => images.push(id),
            Ok(b"Form") => {
                if let Ok(resources) = stream.dict.get(b"Resources") {
                    self.collect_from_resources(resources, images, seen);
                }
            }
            _ => {}
        }
    }
}
