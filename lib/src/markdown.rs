use pulldown_cmark::{html, Options, Parser};

/// A Markdown to HTML renderer.
#[derive(Debug, Clone, Copy)]
pub struct Markdown {
    options: Options,
}

impl Default for Markdown {
    fn default() -> Self {
        Markdown {
            options: Options::all().difference(Options::ENABLE_SMART_PUNCTUATION),
        }
    }
}

impl Markdown {
    pub fn render(&self, input: &str) -> String {
        let parser = Parser::new_ext(input, self.options);
        let mut html_output = String::with_capacity(input.len() * 3 / 2);
        html::push_html(&mut html_output, parser);
        html_output
    }
}

/// Renders `input` with the default [`Markdown`] options.
pub fn to_html(input: &str) -> String {
    Markdown::default().render(input)
}
