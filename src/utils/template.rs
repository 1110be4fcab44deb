//! String template rendering utilities.

pub struct TemplateVars;

impl TemplateVars {
    pub const VERSION: &'static str = "version";
    pub const OS: &'static str = "os";
    pub const ARCH: &'static str = "arch";
}

pub fn render<V: AsRef<str>>(template: &str, variables: &[(&str, V)]) -> String {
    let mut result = template.to_string();

    for (key, value) in variables {
        let placeholder = format!("{{{{{}}}}}", key);
        result = result.replace(&placeholder, value.as_ref());
    }

    result
}
