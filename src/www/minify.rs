/// Turns source text into a smaller equivalent.
pub trait Minifier {
    fn minify(&self, text: &str) -> String;
}

/// Strips comments and the whitespace CSS does not need.
#[derive(Debug, Default, Clone, Copy)]
pub struct CssMinifier;

impl Minifier for CssMinifier {
    fn minify(&self, text: &str) -> String {
        let mut out = String::with_capacity(text.len());
        let mut chars = text.chars().peekable();
        let mut quote: Option<char> = None;
        let mut pending_space = false;
        // One entry per open `{`: true when the block holds rules, not declarations.
        let mut blocks: Vec<bool> = Vec::new();
        let mut statement_start = 0;

        while let Some(c) = chars.next() {
            if let Some(q) = quote {
                out.push(c);
                if c == '\\' {
                    if let Some(next) = chars.next() {
                        out.push(next);
                    }
                } else if c == q {
                    quote = None;
                }
                continue;
            }

            match c {
                '/' if chars.peek() == Some(&'*') => {
                    chars.next();
                    let mut prev = '\0';
                    for c in chars.by_ref() {
                        if prev == '*' && c == '/' {
                            break;
                        }
                        prev = c;
                    }
                }
                c if c.is_whitespace() => pending_space = true,
                _ => {
                    let in_declarations = blocks.last() == Some(&false);
                    if pending_space
                        && !out.is_empty()
                        && !drops_space_before(c, in_declarations)
                        && !out.ends_with(is_css_punct)
                    {
                        out.push(' ');
                    }
                    pending_space = false;
                    match c {
                        '"' | '\'' => quote = Some(c),
                        '{' => blocks.push(holds_rules(&out[statement_start..])),
                        '}' => {
                            if out.ends_with(';') {
                                out.pop();
                            }
                            blocks.pop();
                        }
                        _ => {}
                    }
                    out.push(c);
                    if matches!(c, '{' | '}' | ';') {
                        statement_start = out.len();
                    }
                }
            }
        }

        out
    }
}

fn is_css_punct(c: char) -> bool {
    matches!(c, '{' | '}' | ';' | ':' | ',' | '>')
}

/// A space before `:` is a descendant combinator in a selector, so it only
/// goes away inside a declaration block.
fn drops_space_before(c: char, in_declarations: bool) -> bool {
    match c {
        ':' => in_declarations,
        _ => is_css_punct(c),
    }
}

/// Whether the block opened after `prelude` nests rules (`@media` and friends).
fn holds_rules(prelude: &str) -> bool {
    const GROUPING: [&str; 5] = ["@media", "@supports", "@layer", "@container", "@document"];
    let prelude = prelude.trim_start();
    GROUPING.iter().any(|at| prelude.starts_with(at))
}

/// Line-based JS shrinking that never touches the inside of a line:
/// trims indentation, drops blank lines and whole-line `//` comments.
/// Lines inside a template literal are kept as written.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsMinifier;

impl Minifier for JsMinifier {
    fn minify(&self, text: &str) -> String {
        let mut kept = Vec::new();
        let mut in_template = false;
        for line in text.lines() {
            let started_inside = in_template;
            in_template = ends_in_template(line, in_template);
            if started_inside {
                kept.push(if in_template { line } else { line.trim_end() });
                continue;
            }
            let line = if in_template {
                line.trim_start()
            } else {
                line.trim()
            };
            if line.is_empty() || line.starts_with("//") {
                continue;
            }
            kept.push(line);
        }
        kept.join("\n")
    }
}

/// Scan one line and report whether it ends inside a backtick string.
/// Single and double quoted strings end with the line; `${}` nesting is not tracked.
fn ends_in_template(line: &str, mut in_template: bool) -> bool {
    let mut quote: Option<char> = None;
    let mut chars = line.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                chars.next();
            }
            '`' if quote.is_none() => in_template = !in_template,
            _ if in_template => {}
            '"' | '\'' => match quote {
                Some(q) if q == c => quote = None,
                None => quote = Some(c),
                Some(_) => {}
            },
            '/' if quote.is_none() && chars.peek() == Some(&'/') => break,
            _ => {}
        }
    }
    in_template
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn css_drops_comments_and_whitespace() {
        let css = "/* header */\nbody {\n  color: red;\n  margin: 0 auto;\n}\n\na > b , c { x: y }\n";
        assert_eq!(
            CssMinifier.minify(css),
            "body{color:red;margin:0 auto}a>b,c{x:y}"
        );
    }

    #[test]
    fn css_keeps_strings_intact() {
        let css = "a::after { content: \"/* not a comment */  x\"; }";
        assert_eq!(
            CssMinifier.minify(css),
            "a::after{content:\"/* not a comment */  x\"}"
        );
    }

    #[test]
    fn css_keeps_descendant_pseudo_class_space() {
        assert_eq!(
            CssMinifier.minify("div :hover { color : red }"),
            "div :hover{color:red}"
        );
        assert_eq!(
            CssMinifier.minify("@media (min-width: 600px) {\n  nav :first-child { margin : 0; }\n}"),
            "@media (min-width:600px){nav :first-child{margin:0}}"
        );
    }

    #[test]
    fn css_semicolon_before_brace_inside_string_survives() {
        assert_eq!(
            CssMinifier.minify("a::after { content: \";}\"; }"),
            "a::after{content:\";}\"}"
        );
    }

    #[test]
    fn js_leaves_template_literal_lines_alone() {
        let js = "const t = `line one\n    // not a comment\n    indented`;\n    // real comment\n    next();";
        assert_eq!(
            JsMinifier.minify(js),
            "const t = `line one\n    // not a comment\n    indented`;\nnext();"
        );
    }

    #[test]
    fn js_backticks_in_quotes_and_comments_are_ignored() {
        let js = "  let q = \"`\"; // `\n    x();";
        assert_eq!(JsMinifier.minify(js), "let q = \"`\"; // `\nx();");
    }

    #[test]
    fn js_trims_lines_and_drops_line_comments() {
        let js = "// banner\nfunction f() {\n    return \"http://x\"; // keep\n}\n\n";
        assert_eq!(
            JsMinifier.minify(js),
            "function f() {\nreturn \"http://x\"; // keep\n}"
        );
    }
}
