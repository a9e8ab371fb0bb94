//! Small in-memory PDFs for tests.

use lopdf::{dictionary, Document, Object};

/// Build a PDF whose pages have the given MediaBox sizes in points.
pub fn pdf_with_page_sizes(sizes: &[(i64, i64)]) -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();

    let kids: Vec<Object> = sizes
        .iter()
        .map(|&(width, height)| {
            doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "MediaBox" => vec![
                    Object::Integer(0),
                    Object::Integer(0),
                    Object::Integer(width),
                    Object::Integer(height),
                ],
            })
            .into()
        })
        .collect();

    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => sizes.len() as i64,
        }),
    );

    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes).expect("in-memory PDF should serialize");
    bytes
}

/// Build a PDF with `pages` pages of identical size.
pub fn uniform_pdf(pages: usize, width: i64, height: i64) -> Vec<u8> {
    pdf_with_page_sizes(&vec![(width, height); pages])
}
