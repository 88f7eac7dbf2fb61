//! Discovery of resources referenced from stylesheets and DOM snapshots.

use cssparser::{ParseError, Parser, ParserInput, Token};
use url::Url;

use crate::types::DomSnapshot;

/// Resolve `href` against `base`. Returns `None` for fragment-only or empty
/// references and for anything `url` cannot parse.
pub fn absolutize(base: &str, href: &str) -> Option<String> {
    let href = href.trim();
    if href.is_empty() || href.starts_with('#') {
        return None;
    }
    if let Ok(absolute) = Url::parse(href) {
        return Some(absolute.to_string());
    }
    Url::parse(base)
        .and_then(|base| base.join(href))
        .ok()
        .map(|url| url.to_string())
}

/// URLs referenced by `css`, in document order, without duplicates.
/// `data:` URIs are inline content and are left out.
///
/// Walks cssparser tokens, so text inside strings and comments never counts
/// as a reference. Only `url(...)` tokens and the string target of `@import`
/// are collected, including ones nested inside blocks and other functions.
pub fn extract_css_urls(css: &str) -> Vec<String> {
    let mut input = ParserInput::new(css);
    let mut parser = Parser::new(&mut input);
    let mut urls = Vec::new();
    walk_tokens(&mut parser, &mut urls);
    urls
}

fn walk_tokens<'i, 't>(parser: &mut Parser<'i, 't>, urls: &mut Vec<String>) {
    let mut import_target = false;
    loop {
        let token = match parser.next() {
            Ok(token) => token.clone(),
            Err(_) => break,
        };
        let after_import = std::mem::take(&mut import_target);
        match token {
            Token::UnquotedUrl(url) => push_url(urls, &url),
            Token::QuotedString(target) if after_import => push_url(urls, &target),
            Token::AtKeyword(name) if name.eq_ignore_ascii_case("import") => {
                import_target = true;
            }
            Token::Function(name) if name.eq_ignore_ascii_case("url") => {
                let _ = parser.parse_nested_block(|nested| {
                    while let Ok(token) = nested.next() {
                        if let Token::QuotedString(url) | Token::UnquotedUrl(url) = token {
                            push_url(urls, url);
                            break;
                        }
                    }
                    Ok::<_, ParseError<'i, ()>>(())
                });
            }
            Token::Function(_)
            | Token::ParenthesisBlock
            | Token::SquareBracketBlock
            | Token::CurlyBracketBlock => {
                let _ = parser.parse_nested_block(|nested| {
                    walk_tokens(nested, urls);
                    Ok::<_, ParseError<'i, ()>>(())
                });
            }
            _ => {}
        }
    }
}

fn push_url(urls: &mut Vec<String>, candidate: &str) {
    let candidate = candidate.trim();
    let inline = candidate
        .get(..5)
        .is_some_and(|scheme| scheme.eq_ignore_ascii_case("data:"));
    if candidate.is_empty() || candidate.starts_with('#') || inline {
        return;
    }
    if !urls.iter().any(|seen| seen == candidate) {
        urls.push(candidate.to_string());
    }
}

/// Absolute URLs of stylesheets linked from the snapshot plus every URL
/// referenced by its inline `<style>` blocks.
pub fn extract_css_resources_from_cdt(snapshot: &DomSnapshot, base_url: &str) -> Vec<String> {
    let mut found: Vec<String> = Vec::new();
    let mut push = |url: Option<String>| {
        if let Some(url) = url {
            if !found.contains(&url) {
                found.push(url);
            }
        }
    };

    for node in &snapshot.nodes {
        if node.is_element("link") {
            let is_stylesheet = node.attribute("rel").is_some_and(|rel| {
                rel.split_ascii_whitespace()
                    .any(|token| token.eq_ignore_ascii_case("stylesheet"))
            });
            if is_stylesheet {
                push(node.attribute("href").and_then(|href| absolutize(base_url, href)));
            }
        } else if node.is_element("style") {
            let text: String = node
                .child_node_indexes
                .iter()
                .filter_map(|&idx| snapshot.nodes.get(idx))
                .filter_map(|child| child.node_value.as_deref())
                .collect();
            for url in extract_css_urls(&text) {
                push(absolutize(base_url, &url));
            }
        }
    }
    found
}
