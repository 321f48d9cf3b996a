//! Module wrappers for files that are not scripts.

use serde_json::Value;

use super::LinkError;

/// A module that creates (or reuses) a `<style id=...>` element in
/// `document.head` and sets its text to `css`. Exports the CSS text.
pub fn style_module(id: &str, css: &str) -> String {
    let id = js_string(id);
    let css = js_string(css);
    format!(
        "const id = {id};\n\
         let style = document.getElementById(id);\n\
         if (!style) {{\n\
         \x20 style = document.createElement(\"style\");\n\
         \x20 style.id = id;\n\
         \x20 document.head.appendChild(style);\n\
         }}\n\
         style.textContent = {css};\n\
         export default style.textContent;\n"
    )
}

/// `export default "data:<mime>;base64,<data>"` for base64-encoded sources.
pub fn binary_module(mime: &str, base64: &str) -> String {
    let url = format!("data:{mime};base64,{}", base64.trim());
    format!("export default {};\n", js_string(&url))
}

/// `export default <json>` after validating the source.
pub fn json_module(path: &str, source: &str) -> Result<String, LinkError> {
    let value: Value = serde_json::from_str(source).map_err(|err| LinkError::InvalidJson {
        path: path.to_string(),
        message: err.to_string(),
    })?;
    Ok(format!("export default {value};\n"))
}

/// `export default "<text>"`.
pub fn text_module(text: &str) -> String {
    format!("export default {};\n", js_string(text))
}

fn js_string(text: &str) -> String {
    Value::String(text.to_string()).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_style_module_escapes_css() {
        let module = style_module("fob-style:a.css", "body::after { content: \"\\n\"; }");
        assert!(module.contains(r#"const id = "fob-style:a.css";"#));
        assert!(module.contains(r#"style.textContent = "body::after { content: \"\\n\"; }";"#));
    }

    #[test]
    fn test_binary_module() {
        assert_eq!(
            binary_module("image/png", "iVBORw0KGgo=\n"),
            "export default \"data:image/png;base64,iVBORw0KGgo=\";\n"
        );
    }

    #[test]
    fn test_json_module() {
        let module = json_module("data.json", r#"{ "a": [1, 2] }"#).unwrap();
        assert_eq!(module, "export default {\"a\":[1,2]};\n");

        let err = json_module("data.json", "{ nope").unwrap_err();
        assert!(matches!(err, LinkError::InvalidJson { .. }));
    }

    #[test]
    fn test_text_module() {
        assert_eq!(text_module("a\n\"b\""), "export default \"a\\n\\\"b\\\"\";\n");
    }
}
