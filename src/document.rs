//! PDF object store
//!
//! Thin wrapper around a loaded `lopdf::Document`: objects live in an arena
//! keyed by object id, so an image shared by several pages is one entry and
//! replacing it is an indexed update.

use lopdf::{Dictionary, Document, Object, ObjectId, Stream};

use crate::error::{CompressError, ImageError};
use crate::transcode::{ColorModel, Predictor, SourceEncoding};

/// Nesting limit when following indirect references and `/Parent` chains
pub(crate) const MAX_RESOLVE_DEPTH: usize = 32;

/// An image XObject as it currently sits in the store
#[derive(Debug, Clone)]
pub struct ImageCandidate<'a> {
    pub id: ObjectId,
    /// Declared width in pixels
    pub width: u32,
    /// Declared height in pixels
    pub height: u32,
    pub encoding: SourceEncoding,
    /// Encoded stream payload
    pub data: &'a [u8],
}

impl ImageCandidate<'_> {
    pub fn byte_len(&self) -> usize {
        self.data.len()
    }
}

/// Loaded document graph for one compression run
pub struct DocumentStore {
    doc: Document,
}

impl DocumentStore {
    /// Parse PDF bytes. Fails when the input is not a usable PDF.
    pub fn load(bytes: &[u8]) -> Result<Self, CompressError> {
        let doc = Document::load_mem(bytes).map_err(CompressError::DocumentParse)?;
        if doc.catalog().is_err() {
            return Err(CompressError::MissingCatalog);
        }
        Ok(Self { doc })
    }

    pub fn document(&self) -> &Document {
        &self.doc
    }

    pub(crate) fn into_document(self) -> Document {
        self.doc
    }

    /// Page ids keyed by 1-based page number, in document order
    pub fn pages(&self) -> Vec<(u32, ObjectId)> {
        self.doc.get_pages().into_iter().collect()
    }

    /// Follow a reference to the object it names
    pub(crate) fn resolve<'a>(&'a self, obj: &'a Object) -> Option<&'a Object> {
        let mut current = obj;
        for _ in 0..MAX_RESOLVE_DEPTH {
            match current {
                Object::Reference(id) => current = self.doc.get_object(*id).ok()?,
                other => return Some(other),
            }
        }
        None
    }

    fn resolve_i64(&self, obj: &Object) -> Option<i64> {
        match self.resolve(obj)? {
            Object::Integer(n) => Some(*n),
            _ => None,
        }
    }

    /// Read the current payload and metadata of an image XObject
    pub fn image_candidate(&self, id: ObjectId) -> Result<ImageCandidate<'_>, ImageError> {
        let stream = match self.doc.get_object(id) {
            Ok(Object::Stream(stream)) => stream,
            Ok(_) => return Err(ImageError::extraction(id, "object is not a stream")),
            Err(e) => return Err(ImageError::extraction(id, e.to_string())),
        };

        let subtype = stream.dict.get(b"Subtype").ok().and_then(|s| match s {
            Object::Name(n) => Some(n.as_slice()),
            _ => None,
        });
        if subtype != Some(b"Image".as_slice()) {
            return Err(ImageError::extraction(id, "stream is not an image XObject"));
        }

        let width = self.dimension(&stream.dict, b"Width");
        let height = self.dimension(&stream.dict, b"Height");
        let (Some(width), Some(height)) = (width, height) else {
            return Err(ImageError::extraction(id, "missing or invalid dimensions"));
        };

        Ok(ImageCandidate {
            id,
            width,
            height,
            encoding: self.source_encoding(stream, width),
            data: &stream.content,
        })
    }

    fn dimension(&self, dict: &Dictionary, key: &[u8]) -> Option<u32> {
        let value = self.resolve_i64(dict.get(key).ok()?)?;
        u32::try_from(value).ok().filter(|v| *v > 0)
    }

    fn source_encoding(&self, stream: &Stream, width: u32) -> SourceEncoding {
        let dict = &stream.dict;
        let filters = self.filter_names(dict);

        let image_mask = matches!(
            dict.get(b"ImageMask").ok().and_then(|m| self.resolve(m)),
            Some(Object::Boolean(true))
        );

        let color = dict
            .get(b"ColorSpace")
            .ok()
            .map(|cs| self.color_model(cs, 0))
            .unwrap_or_else(|| ColorModel::Other("Unspecified".to_string()));

        let bits_per_component = dict
            .get(b"BitsPerComponent")
            .ok()
            .and_then(|b| self.resolve_i64(b))
            .and_then(|b| u32::try_from(b).ok())
            .unwrap_or(8);

        let predictor = filters
            .iter()
            .position(|f| f == "FlateDecode" || f == "Fl")
            .and_then(|index| self.decode_parms(dict, index))
            .and_then(|parms| {
                let get = |key: &[u8]| parms.get(key).ok().and_then(|v| self.resolve_i64(v));
                let kind = get(b"Predictor")?;
                let param = |key: &[u8], default: i64| {
                    usize::try_from(get(key).unwrap_or(default).max(1)).unwrap_or(usize::MAX)
                };
                Some(Predictor {
                    kind,
                    colors: param(b"Colors", 1),
                    bits_per_component: param(b"BitsPerComponent", 8),
                    columns: param(b"Columns", i64::from(width)),
                })
            })
            .filter(|p| p.kind > 1);

        let decode = dict
            .get(b"Decode")
            .ok()
            .and_then(|d| self.resolve(d))
            .and_then(|d| d.as_array().ok())
            .map(|arr| arr.iter().filter_map(|v| self.resolve_f64(v)).collect());

        SourceEncoding {
            filters,
            color,
            bits_per_component,
            predictor,
            decode,
            image_mask,
        }
    }

    fn resolve_f64(&self, obj: &Object) -> Option<f64> {
        match self.resolve(obj)? {
            Object::Integer(n) => Some(*n as f64),
            Object::Real(r) => Some(f64::from(*r)),
            _ => None,
        }
    }

    fn filter_names(&self, dict: &Dictionary) -> Vec<String> {
        let Some(filter) = dict.get(b"Filter").ok().and_then(|f| self.resolve(f)) else {
            return Vec::new();
        };
        match filter {
            Object::Name(n) => vec![String::from_utf8_lossy(n).to_string()],
            Object::Array(arr) => arr
                .iter()
                .filter_map(|f| match self.resolve(f) {
                    Some(Object::Name(n)) => Some(String::from_utf8_lossy(n).to_string()),
                    _ => None,
                })
                .collect(),
            _ => Vec::new(),
        }
    }

    /// `/DecodeParms` for the filter at `index`; either a single dictionary
    /// or an array parallel to `/Filter`.
    fn decode_parms<'a>(&'a self, dict: &'a Dictionary, index: usize) -> Option<&'a Dictionary> {
        match self.resolve(dict.get(b"DecodeParms").ok()?)? {
            Object::Dictionary(d) => Some(d),
            Object::Array(arr) => match self.resolve(arr.get(index)?)? {
                Object::Dictionary(d) => Some(d),
                _ => None,
            },
            _ => None,
        }
    }

    fn color_model(&self, obj: &Object, depth: usize) -> ColorModel {
        if depth > MAX_RESOLVE_DEPTH {
            return ColorModel::Other("Unknown".to_string());
        }
        match obj {
            Object::Name(name) => ColorModel::from_name(name),
            Object::Array(arr) => match arr.first() {
                Some(Object::Name(name)) if name.as_slice() == b"ICCBased" => arr
                    .get(1)
                    .and_then(|profile| self.resolve(profile))
                    .and_then(|profile| match profile {
                        Object::Stream(s) => {
                            s.dict.get(b"N").ok().and_then(|n| self.resolve_i64(n))
                        }
                        _ => None,
                    })
                    .map(ColorModel::from_components)
                    .unwrap_or_else(|| ColorModel::Other("ICCBased".to_string())),
                Some(Object::Name(name)) => ColorModel::from_name(name),
                _ => ColorModel::Other("Unknown".to_string()),
            },
            Object::Reference(id) => match self.doc.get_object(*id) {
                Ok(resolved) => self.color_model(resolved, depth + 1),
                Err(_) => ColorModel::Other("Unknown".to_string()),
            },
            _ => ColorModel::Other("Unknown".to_string()),
        }
    }

    /// Overwrite the payload of an existing stream object. Only `/Length`
    /// follows the new bytes; other metadata is left as it was.
    pub fn replace_stream(&mut self, id: ObjectId, content: Vec<u8>) -> Result<(), ImageError> {
        let stream = self
            .doc
            .get_object_mut(id)
            .and_then(Object::as_stream_mut)
            .map_err(|e| ImageError::Commit {
                id,
                reason: e.to_string(),
            })?;
        stream.set_content(content);
        Ok(())
    }

    /// Describe a replaced payload as an 8-bit RGB JPEG of the given size.
    /// Entries tied to the old encoding are dropped.
    pub fn retag_as_jpeg(
        &mut self,
        id: ObjectId,
        width: u32,
        height: u32,
    ) -> Result<(), ImageError> {
        let stream = self
            .doc
            .get_object_mut(id)
            .and_then(Object::as_stream_mut)
            .map_err(|e| ImageError::Commit {
                id,
                reason: e.to_string(),
            })?;

        let dict = &mut stream.dict;
        dict.set("Width", Object::Integer(i64::from(width)));
        dict.set("Height", Object::Integer(i64::from(height)));
        dict.set("ColorSpace", Object::Name(b"DeviceRGB".to_vec()));
        dict.set("BitsPerComponent", Object::Integer(8));
        dict.set("Filter", Object::Name(b"DCTDecode".to_vec()));
        dict.remove(b"DecodeParms");
        dict.remove(b"Decode");
        // colour-key masks are expressed in the old colour space
        if matches!(dict.get(b"Mask"), Ok(Object::Array(_))) {
            dict.remove(b"Mask");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lopdf::dictionary;

    fn store_with(objects: Vec<(ObjectId, Object)>) -> DocumentStore {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => Vec::<Object>::new(),
                "Count" => 0,
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);
        for (id, object) in objects {
            doc.objects.insert(id, object);
        }
        DocumentStore { doc }
    }

    fn image_stream(dict: Dictionary, len: usize) -> Object {
        Object::Stream(Stream::new(dict, vec![7u8; len]))
    }

    #[test]
    fn test_load_rejects_garbage() {
        let err = DocumentStore::load(b"this is not a pdf").err().unwrap();
        assert!(err.is_parse_error());
    }

    #[test]
    fn test_candidate_metadata() {
        let store = store_with(vec![
            (
                (50, 0),
                image_stream(
                    dictionary! {
                        "Subtype" => "Image",
                        "Width" => 1600,
                        "Height" => Object::Reference((51, 0)),
                        "ColorSpace" => vec![Object::Name(b"ICCBased".to_vec()), Object::Reference((52, 0))],
                        "BitsPerComponent" => 8,
                        "Filter" => vec![Object::Name(b"FlateDecode".to_vec())],
                        "DecodeParms" => dictionary! { "Predictor" => 15, "Colors" => 3, "Columns" => 1600 },
                    },
                    10,
                ),
            ),
            ((51, 0), Object::Integer(900)),
            ((52, 0), Object::Stream(Stream::new(dictionary! { "N" => 3 }, vec![]))),
        ]);

        let c = store.image_candidate((50, 0)).unwrap();
        assert_eq!((c.width, c.height, c.byte_len()), (1600, 900, 10));
        assert_eq!(c.encoding.color, ColorModel::Rgb);
        assert_eq!(c.encoding.filters, vec!["FlateDecode".to_string()]);
        assert_eq!(
            c.encoding.predictor,
            Some(Predictor {
                kind: 15,
                colors: 3,
                bits_per_component: 8,
                columns: 1600
            })
        );
        assert!(!c.encoding.image_mask);
        assert!(c.encoding.decode.is_none());
    }

    #[test]
    fn test_extraction_failures() {
        let store = store_with(vec![
            ((60, 0), image_stream(dictionary! { "Subtype" => "Image", "Width" => 10 }, 4)),
            ((61, 0), image_stream(dictionary! { "Subtype" => "Form" }, 4)),
            ((62, 0), Object::Integer(3)),
        ]);
        for id in [(60, 0), (61, 0), (62, 0), (99, 0)] {
            let err = store.image_candidate(id).unwrap_err();
            assert!(matches!(err, ImageError::Extraction { .. }), "{:?}", id);
        }
    }

    #[test]
    fn test_replace_and_retag() {
        let mut store = store_with(vec![(
            (70, 0),
            image_stream(
                dictionary! {
                    "Subtype" => "Image",
                    "Width" => 2400,
                    "Height" => 1600,
                    "ColorSpace" => "DeviceCMYK",
                    "BitsPerComponent" => 8,
                    "Filter" => "FlateDecode",
                    "DecodeParms" => dictionary! { "Predictor" => 15 },
                    "Decode" => vec![Object::Integer(1), Object::Integer(0)],
                    "Mask" => vec![Object::Integer(0), Object::Integer(10)],
                },
                1000,
            ),
        )]);

        store.replace_stream((70, 0), vec![1, 2, 3]).unwrap();
        {
            let c = store.image_candidate((70, 0)).unwrap();
            assert_eq!(c.data, &[1, 2, 3]);
            // metadata untouched by replace_stream
            assert_eq!((c.width, c.height), (2400, 1600));
            assert_eq!(c.encoding.decode, Some(vec![1.0, 0.0]));
        }

        store.retag_as_jpeg((70, 0), 1200, 800).unwrap();
        let c = store.image_candidate((70, 0)).unwrap();
        assert_eq!((c.width, c.height), (1200, 800));
        assert_eq!(c.encoding.filters, vec!["DCTDecode".to_string()]);
        assert_eq!(c.encoding.color, ColorModel::Rgb);
        assert!(c.encoding.predictor.is_none());
        assert!(c.encoding.decode.is_none());

        let dict = &store.document().get_object((70, 0)).unwrap().as_stream().unwrap().dict;
        assert!(dict.get(b"Decode").is_err());
        assert!(dict.get(b"Mask").is_err());
        assert_eq!(dict.get(b"Length").unwrap().as_i64().unwrap(), 3);

        assert!(matches!(
            store.replace_stream((404, 0), vec![]),
            Err(ImageError::Commit { .. })
        ));
    }
}
