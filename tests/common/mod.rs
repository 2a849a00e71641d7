#![allow(dead_code)]

use lopdf::{dictionary, Document, Object, ObjectId, Stream};

/// Deterministic RGB noise; JPEG compresses it poorly, which gives large
/// payloads at modest pixel counts.
pub fn noise_rgb(width: u32, height: u32, seed: u32) -> Vec<u8> {
    let mut state = seed.max(1);
    let mut data = Vec::with_capacity((width * height * 3) as usize);
    for _ in 0..width * height * 3 {
        state ^= state << 13;
        state ^= state >> 17;
        state ^= state << 5;
        data.push((state >> 24) as u8);
    }
    data
}

pub fn flat_rgb(width: u32, height: u32) -> Vec<u8> {
    [90u8, 140, 200].repeat((width * height) as usize)
}

pub fn encode_jpeg(pixels: &[u8], width: u32, height: u32, quality: u8) -> Vec<u8> {
    let mut bytes = Vec::new();
    jpeg_encoder::Encoder::new(&mut bytes, quality)
        .encode(pixels, width as u16, height as u16, jpeg_encoder::ColorType::Rgb)
        .expect("Failed to encode fixture JPEG");
    bytes
}

pub fn jpeg_image(pixels: &[u8], width: u32, height: u32, quality: u8) -> Stream {
    Stream::new(
        dictionary! {
            "Type" => "XObject",
            "Subtype" => "Image",
            "Width" => width,
            "Height" => height,
            "ColorSpace" => "DeviceRGB",
            "BitsPerComponent" => 8,
            "Filter" => "DCTDecode",
        },
        encode_jpeg(pixels, width, height, quality),
    )
}

/// Noise JPEG at quality 90
pub fn noisy_jpeg(width: u32, height: u32) -> Stream {
    jpeg_image(&noise_rgb(width, height, width ^ height), width, height, 90)
}

/// Uncompressed 8-bit RGB samples
pub fn raw_rgb_image(pixels: Vec<u8>, width: u32, height: u32) -> Stream {
    Stream::new(
        dictionary! {
            "Type" => "XObject",
            "Subtype" => "Image",
            "Width" => width,
            "Height" => height,
            "ColorSpace" => "DeviceRGB",
            "BitsPerComponent" => 8,
        },
        pixels,
    )
}

/// Builds small multi-page PDFs with images placed by name
pub struct Fixture {
    doc: Document,
    pages_id: ObjectId,
    font_id: ObjectId,
    kids: Vec<ObjectId>,
}

impl Fixture {
    pub fn new() -> Self {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica",
        });
        Self {
            doc,
            pages_id,
            font_id,
            kids: Vec::new(),
        }
    }

    pub fn add_image(&mut self, stream: Stream) -> ObjectId {
        self.doc.add_object(stream)
    }

    /// Add a page drawing each image as /Im1, /Im2, ... plus a line of text
    pub fn add_page(&mut self, images: &[ObjectId]) -> ObjectId {
        let page_number = self.kids.len() + 1;
        let mut content = format!("BT /F1 24 Tf 72 760 Td (Page {}) Tj ET\n", page_number);
        let mut xobjects = lopdf::Dictionary::new();
        for (i, id) in images.iter().enumerate() {
            let name = format!("Im{}", i + 1);
            content.push_str(&format!("q 200 0 0 150 72 {} cm /{} Do Q\n", 100 + i * 160, name));
            xobjects.set(name, Object::Reference(*id));
        }

        let content_id = self
            .doc
            .add_object(Stream::new(dictionary! {}, content.into_bytes()));
        let page_id = self.doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => self.pages_id,
            "MediaBox" => vec![Object::Integer(0), Object::Integer(0), Object::Integer(612), Object::Integer(792)],
            "Contents" => content_id,
            "Resources" => dictionary! {
                "Font" => dictionary! { "F1" => self.font_id },
                "XObject" => xobjects,
            },
        });
        self.kids.push(page_id);
        page_id
    }

    pub fn finish(mut self) -> Vec<u8> {
        let count = self.kids.len() as i64;
        let kids: Vec<Object> = self.kids.iter().copied().map(Object::Reference).collect();
        self.doc.objects.insert(
            self.pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => count,
            }),
        );
        let catalog_id = self.doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => self.pages_id,
        });
        self.doc.trailer.set("Root", catalog_id);

        let mut bytes = Vec::new();
        self.doc.save_to(&mut bytes).expect("Failed to save fixture PDF");
        bytes
    }
}

/// Image streams a page names in its XObject resources, in declaration order
pub fn page_images(pdf: &[u8], page_number: u32) -> Vec<Stream> {
    let doc = Document::load_mem(pdf).expect("Failed to load PDF");
    let page_id = doc.get_pages()[&page_number];
    let page = doc.get_dictionary(page_id).unwrap();
    let resources = match page.get(b"Resources").unwrap() {
        Object::Reference(id) => doc.get_dictionary(*id).unwrap(),
        Object::Dictionary(d) => d,
        other => panic!("unexpected resources {:?}", other),
    };
    let xobjects = match resources.get(b"XObject").unwrap() {
        Object::Reference(id) => doc.get_dictionary(*id).unwrap(),
        Object::Dictionary(d) => d,
        other => panic!("unexpected XObject entry {:?}", other),
    };
    xobjects
        .iter()
        .map(|(_, value)| {
            let id = value.as_reference().unwrap();
            doc.get_object(id).unwrap().as_stream().unwrap().clone()
        })
        .collect()
}

pub fn page_contents(pdf: &[u8]) -> Vec<Vec<u8>> {
    let doc = Document::load_mem(pdf).expect("Failed to load PDF");
    doc.get_pages()
        .values()
        .map(|id| doc.get_page_content(*id).unwrap())
        .collect()
}

pub fn dict_int(stream: &Stream, key: &[u8]) -> i64 {
    stream.dict.get(key).unwrap().as_i64().unwrap()
}
