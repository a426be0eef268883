//! Template preprocessing.
//!
//! A statechart is written as literal text fragments interleaved with
//! substituted values. Text and number substitutions are inlined into the
//! source; callbacks are left behind as `${N}` slots, where `N` is the index
//! of the value in the original substitution table.

use std::fmt;

/// A value substituted between two literal text fragments.
#[derive(Clone)]
pub enum Substitution<F> {
    /// Inlined verbatim.
    Text(String),
    /// Inlined using its shortest display form.
    Number(f64),
    /// Referenced through a `${N}` slot.
    Callback(F),
}

impl<F> Substitution<F> {
    /// Returns the callback, if this substitution is one.
    pub fn as_callback(&self) -> Option<&F> {
        match self {
            Substitution::Callback(f) => Some(f),
            _ => None,
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            Substitution::Text(_) => "text",
            Substitution::Number(_) => "number",
            Substitution::Callback(_) => "callback",
        }
    }
}

impl<F> fmt::Debug for Substitution<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Substitution::Text(s) => f.debug_tuple("Text").field(s).finish(),
            Substitution::Number(n) => f.debug_tuple("Number").field(n).finish(),
            Substitution::Callback(_) => f.write_str("Callback(..)"),
        }
    }
}

impl<F> From<&str> for Substitution<F> {
    fn from(s: &str) -> Self {
        Substitution::Text(s.to_string())
    }
}

impl<F> From<String> for Substitution<F> {
    fn from(s: String) -> Self {
        Substitution::Text(s)
    }
}

impl<F> From<f64> for Substitution<F> {
    fn from(n: f64) -> Self {
        Substitution::Number(n)
    }
}

impl<F> From<i64> for Substitution<F> {
    fn from(n: i64) -> Self {
        Substitution::Number(n as f64)
    }
}

/// Merged source text plus the substitution table its slots index into.
pub struct Template<F> {
    pub source: String,
    pub slots: Vec<Substitution<F>>,
}

impl<F> Template<F> {
    /// Wraps source text that already carries explicit `${N}` slots.
    pub fn from_source(source: impl Into<String>, callbacks: Vec<F>) -> Self {
        Self {
            source: source.into(),
            slots: callbacks.into_iter().map(Substitution::Callback).collect(),
        }
    }

    /// Starts building a template fragment by fragment.
    pub fn builder() -> TemplateBuilder<F> {
        TemplateBuilder::default()
    }
}

impl<F> fmt::Debug for Template<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Template")
            .field("source", &self.source)
            .field(
                "slots",
                &self.slots.iter().map(Substitution::kind).collect::<Vec<_>>(),
            )
            .finish()
    }
}

/// Merges text fragments and substituted values into one template.
///
/// `fragments` normally holds one more entry than `values`. Values past the
/// last fragment boundary are kept in the table but not referenced.
pub fn preprocess<F>(fragments: &[&str], values: Vec<Substitution<F>>) -> Template<F> {
    let mut source = String::new();

    for (i, fragment) in fragments.iter().enumerate() {
        source.push_str(fragment);
        if i + 1 == fragments.len() {
            break;
        }
        match values.get(i) {
            Some(Substitution::Text(s)) => source.push_str(s),
            Some(Substitution::Number(n)) => source.push_str(&n.to_string()),
            Some(Substitution::Callback(_)) => source.push_str(&format!("${{{}}}", i)),
            None => {}
        }
    }

    Template {
        source,
        slots: values,
    }
}

/// Fluent builder standing in for a tagged template literal.
///
/// ```
/// use exo_compiler::Template;
///
/// let template = Template::<fn()>::builder()
///     .text("main machine m { initial state idle { on:GO ")
///     .callback(|| {})
///     .text(" } }")
///     .build();
/// assert_eq!(template.source, "main machine m { initial state idle { on:GO ${0} } }");
/// ```
pub struct TemplateBuilder<F> {
    fragments: Vec<String>,
    values: Vec<Substitution<F>>,
}

impl<F> Default for TemplateBuilder<F> {
    fn default() -> Self {
        Self {
            fragments: vec![String::new()],
            values: Vec::new(),
        }
    }
}

impl<F> TemplateBuilder<F> {
    /// Appends literal DSL text.
    pub fn text(mut self, text: &str) -> Self {
        if let Some(last) = self.fragments.last_mut() {
            last.push_str(text);
        }
        self
    }

    /// Substitutes a value at the current position.
    pub fn value(mut self, value: impl Into<Substitution<F>>) -> Self {
        self.values.push(value.into());
        self.fragments.push(String::new());
        self
    }

    /// Substitutes a number, e.g. a wait duration's magnitude.
    pub fn number(self, n: f64) -> Self {
        self.value(Substitution::Number(n))
    }

    /// Substitutes a callback, referenced from the source as a slot.
    pub fn callback(self, f: F) -> Self {
        self.value(Substitution::Callback(f))
    }

    pub fn build(self) -> Template<F> {
        let fragments: Vec<&str> = self.fragments.iter().map(String::as_str).collect();
        preprocess(&fragments, self.values)
    }
}
