//! `{placeholder}` expansion for variant URLs and binary patterns.

use anyhow::{Result, bail};
use std::path::Path;

use crate::platform::Platform;

/// Placeholders a formula may use.
pub const PLACEHOLDERS: &[&str] = &["version", "os", "arch", "exe", "dir"];

/// Values substituted into a template.
pub struct TemplateContext<'a> {
    pub version: &'a str,
    pub platform: Platform,
    /// Directory holding the formula file. `None` for the built-in formula.
    pub dir: Option<&'a Path>,
}

impl TemplateContext<'_> {
    fn lookup(&self, name: &str) -> Result<String> {
        Ok(match name {
            "version" => self.version.to_string(),
            "os" => self.platform.os.as_str().to_string(),
            "arch" => self.platform.arch.as_str().to_string(),
            "exe" => self.platform.os.exe_suffix().to_string(),
            "dir" => match self.dir {
                Some(dir) => dir.to_string_lossy().replace('\\', "/"),
                None => bail!("{{dir}} can only be used in a formula loaded from a file"),
            },
            other => bail!("Unknown placeholder {{{}}}", other),
        })
    }
}

/// Returns the placeholder names used in `template`, in order of appearance.
pub fn placeholders(template: &str) -> Result<Vec<&str>> {
    let mut names = Vec::new();
    let mut rest = template;

    while let Some(start) = rest.find('{') {
        let after = &rest[start + 1..];
        let Some(end) = after.find('}') else {
            bail!("Unterminated placeholder in {:?}", template);
        };
        let name = &after[..end];
        if name.is_empty() || name.contains('{') {
            bail!("Malformed placeholder in {:?}", template);
        }
        names.push(name);
        rest = &after[end + 1..];
    }

    if rest.contains('}') {
        bail!("Unmatched '}}' in {:?}", template);
    }

    Ok(names)
}

/// Checks that `template` only uses known placeholders.
pub fn validate(template: &str) -> Result<()> {
    for name in placeholders(template)? {
        if !PLACEHOLDERS.contains(&name) {
            bail!("Unknown placeholder {{{}}} in {:?}", name, template);
        }
    }
    Ok(())
}

pub fn expand(template: &str, ctx: &TemplateContext<'_>) -> Result<String> {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    // placeholders() has already rejected malformed input
    placeholders(template)?;
    while let Some(start) = rest.find('{') {
        out.push_str(&rest[..start]);
        let after = &rest[start + 1..];
        let end = after.find('}').unwrap_or(after.len());
        out.push_str(&ctx.lookup(&after[..end])?);
        rest = after.get(end + 1..).unwrap_or("");
    }
    out.push_str(rest);

    Ok(out)
}
