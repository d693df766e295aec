//! A toolkit for baking static sites out of data, templates, and scripts.
//!
//! # Overview
//!
//! A _site directory_ holds a tree of content files (`data/`), a tree of
//! templates (`templates/`), and an assembly script (`site.lua`). Building
//! the site proceeds as follows:
//!
//! ```text
//!   data/ ──► aggregate() ──► Value ─────┐
//!                 ▲                      │
//!             Registry                   ├──► site script ──► page tree ──► materialize() ──► out/
//!                                        │
//!   templates/ ──► TemplateSet::build() ─┘
//! ```
//!
//!   * **Aggregation** folds every file and folder under `data/` into one
//!     nested [`Value`](value::Value). Files are decoded by extension through
//!     the processor [`Registry`](processor::Registry): structured data
//!     (YAML, JSON, TOML) becomes a dictionary, Markdown becomes
//!     `{ content: <lazy html> }`, and scripts evaluate to whatever they
//!     return. Files sharing a name (`about.yaml`, `about.md`) merge, and a
//!     folder's `index` entry overrides its siblings.
//!
//!   * **Template composition** mirrors `templates/` into a nested
//!     [`TemplateSet`](templating::TemplateSet). Every template is also a
//!     partial named by its path, so `templates/blog/post.html` can be
//!     included anywhere as `"blog/post"`.
//!
//!   * **Assembly** hands both to the site script through a
//!     [`ScriptHost`](script::ScriptHost), which returns a page tree.
//!
//!   * **Materialization** writes the page tree to disk: `{ about = "..." }`
//!     becomes `out/about/index.html`, while `{ ["$robots.txt"] = "..." }`
//!     becomes `out/robots.txt`. Static assets are then copied verbatim.
//!
//! [`Site`](site::Site) ties the steps together.

#[macro_use]
pub mod error;
pub mod util;
pub mod fstree;
pub mod value;
pub mod markdown;
pub mod processor;
pub mod aggregate;
pub mod templating;
pub mod materialize;
pub mod script;
pub mod site;

#[cfg(test)]
mod testing;

pub use aggregate::aggregate;
pub use materialize::{materialize, copy_static};
pub use site::{Site, SiteLayout, Settings, BuildReport};

pub use rayon;
