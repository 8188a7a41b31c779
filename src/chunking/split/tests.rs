use super::*;

fn splitter() -> BoundedSplitter {
    BoundedSplitter::new(&ChunkerConfig::default()).expect("splitter")
}

fn span(text: &str, path: HierarchicalPath) -> StructuralSpan {
    StructuralSpan {
        start: 0,
        end: text.len(),
        path,
        level: None,
        heading: None,
        text: text.to_string(),
    }
}

fn section(number: &str) -> HierarchicalPath {
    HierarchicalPath {
        section: Some(number.to_string()),
        ..HierarchicalPath::default()
    }
}

fn sentences(count: usize) -> String {
    (0..count)
        .map(|index| {
            format!("Clause {index} of this paragraph describes reporting duties of the Loan Parties. ")
        })
        .collect()
}

fn bodies(drafts: &[ChunkDraft]) -> String {
    drafts.iter().map(ChunkDraft::body).collect()
}

fn policy(content_type: ContentType) -> SizePolicy {
    ChunkerConfig::default().policies.for_type(content_type)
}

#[test]
fn span_within_bounds_is_one_complete_unit() {
    let text = "Section 6.12(a) The Borrower shall maintain a Total Leverage Ratio not to exceed 4.50:1.00, tested quarterly.";
    let output = splitter().split(
        text,
        &span(text, section("6.12")),
        ContentType::Covenant,
        policy(ContentType::Covenant),
    );

    assert!(output.conditions.is_empty());
    assert_eq!(output.drafts.len(), 1);
    let draft = &output.drafts[0];
    assert!(draft.is_complete_unit);
    assert_eq!(draft.text, text);
    assert_eq!(draft.boundary, Boundary::Structural);
    assert_eq!((draft.body_start, draft.body_end), (0, text.len()));
}

#[test]
fn letter_subsections_split_and_extend_the_path() {
    let text = format!(
        "Section 7.02 Liens. The Borrower shall not create any Lien on any of its property, except:\n(a) Liens securing the Obligations; {}\n(b) Liens existing on the Closing Date; {}",
        sentences(17).trim_end(),
        sentences(17).trim_end()
    );
    assert!(text.len() > 2500);

    let output = splitter().split(
        &text,
        &span(&text, section("7.02")),
        ContentType::Covenant,
        policy(ContentType::Covenant),
    );

    assert_eq!(output.drafts.len(), 2);
    assert_eq!(output.drafts[0].path.segments(), vec!["7.02", "(a)"]);
    assert_eq!(output.drafts[1].path.segments(), vec!["7.02", "(b)"]);
    assert_eq!(output.drafts[0].source_start, 0);
    assert!(output.drafts[0].text.starts_with("Section 7.02 Liens."));
    assert!(output.drafts.iter().all(|draft| draft.is_complete_unit));
    assert_eq!(output.drafts[0].boundary, Boundary::Subsection);
    assert_eq!(output.drafts[1].boundary, Boundary::Structural);
    assert_eq!(bodies(&output.drafts), text);
}

#[test]
fn letters_continue_through_i_and_romans_nest_below() {
    let text = "Lead:\n(g) one.\n(h) two.\n(i) three.\n(j) four; (i) sub one; (ii) sub two. See clause (a) above.";
    let markers = splitter().sub_markers(text, 0, text.len());

    let summary = markers
        .iter()
        .map(|marker| (marker.label.as_str(), marker.level))
        .collect::<Vec<(&str, MarkerLevel)>>();
    assert_eq!(
        summary,
        vec![
            ("(g)", MarkerLevel::Subsection),
            ("(h)", MarkerLevel::Subsection),
            ("(i)", MarkerLevel::Subsection),
            ("(j)", MarkerLevel::Subsection),
            ("(i)", MarkerLevel::Clause),
            ("(ii)", MarkerLevel::Clause),
        ]
    );
}

#[test]
fn separator_fragments_stay_bounded_and_cut_between_words() {
    let text = sentences(40);
    let text = text.trim_end();
    let general = policy(ContentType::General);

    let output = splitter().split(
        text,
        &span(text, HierarchicalPath::default()),
        ContentType::General,
        general,
    );

    assert!(output.drafts.len() >= 3);
    assert!(output.conditions.is_empty());
    assert_eq!(bodies(&output.drafts), text);

    for (index, draft) in output.drafts.iter().enumerate() {
        assert!(!draft.is_complete_unit);
        assert!(draft.text.len() <= general.max_chars, "fragment {index} too long");
        assert!(draft.body().len() >= 80, "fragment {index} too short");
        if draft.source_end < text.len() {
            let next = text[draft.source_end..].chars().next().expect("next char");
            assert!(!next.is_alphanumeric());
            assert_eq!(draft.boundary, Boundary::Sentence);
            assert!(draft.body().ends_with('.'));
        }
    }

    let second = &output.drafts[1];
    assert!(second.body_start > 0);
    let overlap = second.text[..second.body_start].trim();
    assert!(output.drafts[0].body().ends_with(overlap));
    assert!(overlap.len() <= general.overlap_chars);
}

#[test]
fn covenant_exceptions_move_to_continued_fragments() {
    let text = format!(
        "The Borrower shall not permit the Consolidated Leverage Ratio as of the last day of any fiscal quarter to exceed 3.50 to 1.00. {}provided that the Borrower may elect a temporary step-up following a Material Acquisition. {}Excluding any quarter ending before the Closing Date, the ratio shall be tested quarterly. {}",
        sentences(9),
        sentences(8),
        sentences(8)
    );
    let text = text.trim_end();

    let output = splitter().split(
        text,
        &span(text, section("6.12")),
        ContentType::Covenant,
        policy(ContentType::Covenant),
    );

    assert_eq!(output.drafts.len(), 3);
    assert!(output.drafts[0].text.starts_with("The Borrower shall not permit"));
    assert_eq!(output.drafts[0].boundary, Boundary::ExceptionClause);
    assert!(output.drafts[1].text.starts_with("(continued) "));
    assert!(output.drafts[1].body().trim_start().starts_with("provided that"));
    assert!(output.drafts[2].text.starts_with("(continued) "));
    assert!(output.drafts[2].body().trim_start().starts_with("Excluding"));
    assert_eq!(bodies(&output.drafts), text);
    for draft in &output.drafts {
        assert!(draft.text.len() <= 1500);
    }
}

#[test]
fn definition_fragments_always_carry_the_term() {
    let text = format!(
        "\"EBITDA\" means, for any period, Consolidated Net Income for such period plus the following amounts to the extent deducted in computing Consolidated Net Income. {}\n\"Fixed Charges\" means, for any period, the sum of cash interest expense and scheduled principal payments.",
        sentences(28).trim_end()
    );

    let output = splitter().split(
        &text,
        &span(&text, HierarchicalPath::default()),
        ContentType::Definition,
        policy(ContentType::Definition),
    );

    let ebitda = output
        .drafts
        .iter()
        .filter(|draft| draft.defining_term.as_deref() == Some("EBITDA"))
        .collect::<Vec<&ChunkDraft>>();
    assert!(ebitda.len() >= 2);
    for draft in &ebitda {
        assert!(draft.text.contains("\"EBITDA\""));
        assert!(draft.text.len() <= 1200);
    }
    assert!(ebitda[1].text.starts_with("\"EBITDA\" (continued)"));

    let last = output.drafts.last().expect("fixed charges unit");
    assert_eq!(last.defining_term.as_deref(), Some("Fixed Charges"));
    assert!(last.is_complete_unit);
    assert!(last.text.trim_start().starts_with("\"Fixed Charges\" means"));
    assert_eq!(bodies(&output.drafts), text);
}

#[test]
fn unbroken_run_is_hard_cut_and_reported() {
    let text = "x".repeat(2500);

    let output = splitter().split(
        &text,
        &span(&text, section("9.01")),
        ContentType::General,
        policy(ContentType::General),
    );

    assert_eq!(output.drafts.len(), 3);
    assert_eq!(output.conditions.len(), 2);
    assert!(matches!(
        output.conditions[0],
        ChunkError::OversizeUnsplittable { len: 2500, max: 1000, .. }
    ));
    assert_eq!(output.drafts[0].boundary, Boundary::HardCut);
    assert!(output.drafts.iter().all(|draft| !draft.is_complete_unit));
    assert_eq!(bodies(&output.drafts), text);
}

#[test]
fn definition_term_found_mid_line_still_labels_fragments() {
    let text = format!(
        "Section 1.01 Defined Terms. \"EBITDA\" means, for any period, Consolidated Net Income for such period plus the following amounts to the extent deducted in computing Consolidated Net Income. {}",
        sentences(26).trim_end()
    );
    assert!(text.len() > 2000);

    let output = splitter().split(
        &text,
        &span(&text, section("1.01")),
        ContentType::Definition,
        policy(ContentType::Definition),
    );

    assert!(output.drafts.len() >= 2);
    for draft in &output.drafts {
        assert_eq!(draft.defining_term.as_deref(), Some("EBITDA"));
        assert!(draft.text.contains("\"EBITDA\""));
        assert!(draft.text.len() <= 1200);
    }
    assert!(output.drafts[1].text.starts_with("\"EBITDA\" (continued)"));
    assert_eq!(bodies(&output.drafts), text);
}

#[test]
fn inline_subsection_keeps_its_own_lead_in() {
    let filler = sentences(8);
    let filler = filler.trim_end();
    let text = format!(
        "Section 6.12(a) The Borrower shall not permit the Total Leverage Ratio to exceed 4.50:1.00. {filler}\n(b) The Borrower shall not permit the Interest Coverage Ratio to be less than 3.00:1.00. {filler}\n(c) The Borrower shall maintain Liquidity of at least $25,000,000. {filler}"
    );
    assert!(text.len() > 1500);
    let path = HierarchicalPath {
        subsection: Some("(a)".to_string()),
        ..section("6.12")
    };

    let output = splitter().split(
        &text,
        &span(&text, path),
        ContentType::Covenant,
        policy(ContentType::Covenant),
    );

    let paths = output
        .drafts
        .iter()
        .map(|draft| draft.path.key())
        .collect::<Vec<String>>();
    assert_eq!(paths, vec!["6.12/(a)", "6.12/(b)", "6.12/(c)"]);
    assert!(output.drafts[0].text.starts_with("Section 6.12(a) The Borrower"));
    assert!(output.drafts[1].text.starts_with("\n(b) The Borrower"));
    assert!(output.drafts.iter().all(|draft| draft.is_complete_unit));
    assert_eq!(bodies(&output.drafts), text);
}
