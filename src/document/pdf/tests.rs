use super::*;
use crate::document::{UNKNOWN_AUTHOR, chunking};
use lopdf::content::{Content, Operation};
use lopdf::{Stream, dictionary};

/// Build a small PDF whose pages each hold the given lines of text, 20pt apart
fn build_pdf(pages_text: &[&[&str]], info: Option<(&str, &str)>) -> Vec<u8> {
    let pages = pages_text
        .iter()
        .map(|lines| {
            let mut operations = Vec::new();
            for (i, line) in lines.iter().enumerate() {
                operations.push(Operation::new("BT", vec![]));
                operations.push(Operation::new("Tf", vec!["F1".into(), 12.into()]));
                operations.push(Operation::new(
                    "Td",
                    vec![72.into(), (720 - 20 * i as i64).into()],
                ));
                operations.push(Operation::new("Tj", vec![Object::string_literal(*line)]));
                operations.push(Operation::new("ET", vec![]));
            }
            operations
        })
        .collect();
    build_pdf_from_operations(pages, info)
}

/// Build a PDF with one page per operation list, fonts F1 (Courier) and F2 (Courier-Bold)
fn build_pdf_from_operations(pages: Vec<Vec<Operation>>, info: Option<(&str, &str)>) -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Courier",
    });
    let bold_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Courier-Bold",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! {
            "F1" => font_id,
            "F2" => bold_id,
        },
    });

    let mut kids: Vec<Object> = Vec::new();
    for operations in pages {
        let content = Content { operations };
        let content_id = doc.add_object(Stream::new(
            dictionary! {},
            content.encode().expect("content encodes"),
        ));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
        });
        kids.push(page_id.into());
    }

    let count = kids.len() as i64;
    let pages = dictionary! {
        "Type" => "Pages",
        "Kids" => kids,
        "Count" => count,
        "Resources" => resources_id,
        "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
    };
    doc.objects.insert(pages_id, Object::Dictionary(pages));

    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    if let Some((title, author)) = info {
        let info_id = doc.add_object(dictionary! {
            "Title" => Object::string_literal(title),
            "Author" => Object::string_literal(author),
        });
        doc.trailer.set("Info", info_id);
    }

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes).expect("pdf saves");
    bytes
}

#[test]
fn extracts_pages_in_order() {
    let bytes = build_pdf(
        &[
            &["Keibul Lamjao National Park", "The only floating park in the world"],
            &["Home of the brow-antlered deer known as sangai"],
        ],
        None,
    );

    let document = extract_document_from_bytes(&bytes).expect("pdf extracts");

    assert_eq!(document.pages.len(), 2);
    assert_eq!(document.pages[0].page_num, 1);
    assert_eq!(document.pages[1].page_num, 2);
    assert!(document.pages[0].text().contains("Keibul Lamjao"));
    assert!(document.pages[1].text().contains("sangai"));
    assert!(document.full_text().contains("floating park"));
}

#[test]
fn embedded_metadata_is_used() {
    let bytes = build_pdf(
        &[&["Some page text long enough to be a title"]],
        Some(("Sangai Festival Guide", "Tourism Department")),
    );

    let document = extract_document_from_bytes(&bytes).expect("pdf extracts");
    assert_eq!(document.metadata.title, "Sangai Festival Guide");
    assert_eq!(document.metadata.author, "Tourism Department");
}

#[test]
fn missing_metadata_falls_back_to_first_page() {
    let bytes = build_pdf(&[&["Manipuri Classical Dance"]], None);

    let document = extract_document_from_bytes(&bytes).expect("pdf extracts");
    assert!(document.metadata.title.contains("Manipuri Classical Dance"));
    assert_eq!(document.metadata.author, UNKNOWN_AUTHOR);
}

#[test]
fn extracted_pages_feed_the_chunker() {
    let bytes = build_pdf(
        &[&["Ras Lila is performed on full moon nights in autumn"]],
        None,
    );
    let document = extract_document_from_bytes(&bytes).expect("pdf extracts");

    let chunks = chunking::chunk_document(&document, &chunking::ChunkingConfig::default());
    assert_eq!(chunks.len(), 1);
    assert_eq!(chunks[0].page_num(), Some(1));
    assert!(chunks[0].text().contains("full moon"));
}

#[test]
fn invalid_bytes_are_a_pdf_error() {
    let result = extract_document_from_bytes(b"definitely not a pdf");
    assert!(matches!(result, Err(QaError::Pdf(_))));
}

#[test]
fn missing_file_is_a_pdf_error() {
    let result = extract_document(Path::new("/nonexistent/document.pdf"));
    assert!(matches!(result, Err(QaError::Pdf(_))));
}

#[test]
fn decode_utf16_and_latin1_strings() {
    let utf16 = [0xFE, 0xFF, 0x00, 0x4D, 0x00, 0x61, 0xAB, 0xC3];
    assert_eq!(decode_pdf_string(&utf16), "Ma\u{ABC3}");

    assert_eq!(decode_pdf_string(b"Caf\xe9"), "Café");
}

fn text_block(operations: Vec<Operation>) -> Vec<Operation> {
    let mut page = vec![Operation::new("BT", vec![])];
    page.extend(operations);
    page.push(Operation::new("ET", vec![]));
    page
}

#[test]
fn spans_carry_font_size_and_position() {
    let bytes = build_pdf(&[&["Keibul Lamjao National Park lies on Loktak"]], None);
    let document = extract_document_from_bytes(&bytes).expect("pdf extracts");

    let config = chunking::ChunkingConfig {
        policy: chunking::ChunkingPolicy::LayoutSpans,
        min_text_length: 1,
        ..chunking::ChunkingConfig::default()
    };
    let chunks = chunking::chunk_document(&document, &config);
    assert_eq!(chunks.len(), 1);

    let layout = chunks[0].layout().expect("span layout");
    assert_eq!(layout.font, "Courier");
    assert_eq!(layout.font_size, 12.0);
    // Baseline at y = 720 on a 792pt page, measured from the top
    assert_eq!(layout.bbox[0], 72.0);
    assert_eq!(layout.bbox[3], 72.0);
    assert_eq!(layout.bbox[1], 60.0);
    assert!(layout.bbox[2] > layout.bbox[0]);
}

#[test]
fn baselines_and_gaps_form_lines_and_blocks() {
    let page = text_block(vec![
        Operation::new("Tf", vec!["F1".into(), 12.into()]),
        Operation::new("Td", vec![72.into(), 720.into()]),
        Operation::new(
            "TJ",
            vec![Object::Array(vec![
                Object::string_literal("Loktak"),
                Object::Integer(-250),
                Object::string_literal("lake"),
            ])],
        ),
        Operation::new("Tj", vec![Object::string_literal(" is shallow")]),
        Operation::new("Td", vec![0.into(), (-14).into()]),
        Operation::new("Tj", vec![Object::string_literal("and full of phumdis")]),
        Operation::new("Td", vec![0.into(), (-60).into()]),
        Operation::new("Tj", vec![Object::string_literal("Sangai")]),
    ]);
    let bytes = build_pdf_from_operations(vec![page], None);
    let document = extract_document_from_bytes(&bytes).expect("pdf extracts");

    let blocks = &document.pages[0].blocks;
    assert_eq!(blocks.len(), 2);
    assert_eq!(blocks[0].lines.len(), 2);
    assert_eq!(blocks[0].lines[0].spans.len(), 1);
    assert_eq!(blocks[0].lines[0].text(), "Loktak lake is shallow");
    assert_eq!(blocks[0].lines[1].text(), "and full of phumdis");
    assert_eq!(blocks[1].lines[0].text(), "Sangai");
}

#[test]
fn font_changes_split_a_line_into_spans() {
    let page = text_block(vec![
        Operation::new("Tf", vec!["F2".into(), 14.into()]),
        Operation::new("Td", vec![72.into(), 720.into()]),
        Operation::new("Tj", vec![Object::string_literal("Note:")]),
        Operation::new("Tf", vec!["F1".into(), 12.into()]),
        Operation::new("Tj", vec![Object::string_literal(" boats need a permit")]),
    ]);
    let bytes = build_pdf_from_operations(vec![page], None);
    let document = extract_document_from_bytes(&bytes).expect("pdf extracts");

    let line = &document.pages[0].blocks[0].lines[0];
    assert_eq!(line.spans.len(), 2);
    assert_eq!(line.spans[0].font.as_deref(), Some("Courier-Bold"));
    assert_eq!(line.spans[0].font_size, Some(14.0));
    assert_eq!(line.spans[1].font.as_deref(), Some("Courier"));
    assert_eq!(line.text(), "Note: boats need a permit");
}

#[test]
fn text_matrix_scales_the_font_size() {
    let page = text_block(vec![
        Operation::new("Tf", vec!["F1".into(), 10.into()]),
        Operation::new(
            "Tm",
            vec![2.into(), 0.into(), 0.into(), 2.into(), 100.into(), 500.into()],
        ),
        Operation::new("Tj", vec![Object::string_literal("Heading")]),
    ]);
    let bytes = build_pdf_from_operations(vec![page], None);
    let document = extract_document_from_bytes(&bytes).expect("pdf extracts");

    let span = &document.pages[0].blocks[0].lines[0].spans[0];
    assert_eq!(span.text, "Heading");
    assert_eq!(span.font_size, Some(20.0));
    assert_eq!(span.bbox.map(|b| b[0]), Some(100.0));
}
