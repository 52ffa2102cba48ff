use qapair::HtmlTextExtractor;

#[test]
fn multiline_code_is_kept_as_markup() {
    let x = HtmlTextExtractor::new();
    assert_eq!(x.text("<p>see <code>x\ny</code> here</p>"), "see <code>x\ny</code> here");
}

#[test]
fn single_line_code_is_flattened() {
    let x = HtmlTextExtractor::new();
    assert_eq!(x.text("<p>call <code>inline()</code> now</p>"), "call inline() now");
}

#[test]
fn preserved_element_descendants_are_not_visited_again() {
    let x = HtmlTextExtractor::new();
    let out = x.fragments("<pre><code>let a = 1;\n<b>bold</b></code></pre>");
    assert_eq!(out, vec!["<code>let a = 1;\n<b>bold</b></code>".to_string()]);
    assert_eq!(x.text("<pre><code>let a = 1;\n<b>bold</b></code></pre>").matches("bold").count(), 1);
}

#[test]
fn text_nodes_come_out_in_document_order() {
    let x = HtmlTextExtractor::new();
    let frags = x.fragments("<p>one <em>two</em> three</p><ul><li>four</li></ul>");
    assert_eq!(frags, vec!["one ", "two", " three", "four"]);
}

#[test]
fn entities_are_decoded() {
    let x = HtmlTextExtractor::new();
    assert_eq!(x.text("<p>1 &lt; 2 &amp;&amp; 3 &gt; 2</p>"), "1 < 2 && 3 > 2");
}

#[test]
fn plain_extractor_flattens_everything() {
    let x = HtmlTextExtractor::plain();
    assert_eq!(x.text("<code>a\nb</code>"), "a\nb");
}

#[test]
fn custom_preserve_set() {
    let x = HtmlTextExtractor::new().preserve(["PRE"]);
    let out = x.text("<pre>line1\nline2</pre>");
    assert!(out.starts_with("<pre>"), "{out}");
    assert!(out.contains("line1\nline2"));
}

#[test]
fn blank_text_nodes_can_be_skipped() {
    let markup = "<p>a</p>\n<p>b</p>";
    assert_eq!(HtmlTextExtractor::new().fragments(markup), vec!["a", "\n", "b"]);
    assert_eq!(HtmlTextExtractor::new().skip_blank(true).fragments(markup), vec!["a", "b"]);
}

#[test]
fn empty_and_plain_text_inputs() {
    let x = HtmlTextExtractor::new();
    assert_eq!(x.text(""), "");
    assert_eq!(x.text("just words"), "just words");
}
