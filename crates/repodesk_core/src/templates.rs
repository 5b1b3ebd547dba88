//! Starter content for newly authored files, keyed by extension.

use chrono::{NaiveDate, Utc};

/// Placeholder content for a new file called `file_name`, dated today.
pub fn starter_content(file_name: &str) -> String {
    starter_content_on(file_name, Utc::now().date_naive())
}

/// Placeholder content for a new file called `file_name`, dated `date`.
pub fn starter_content_on(file_name: &str, date: NaiveDate) -> String {
    let ext = file_name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();

    match ext.as_str() {
        "html" | "htm" => HTML.to_string(),
        "css" => CSS.to_string(),
        "js" | "mjs" => JS.to_string(),
        "ts" => TS.to_string(),
        "jsx" | "tsx" => JSX.to_string(),
        "py" => PY.to_string(),
        "rs" => RS.to_string(),
        "json" => JSON.to_string(),
        "md" => {
            let title = file_name
                .strip_suffix(".md")
                .or_else(|| file_name.strip_suffix(".MD"))
                .unwrap_or(file_name);
            format!("# {title}\n\nStarted on {date}.\n")
        }
        "txt" | "" => String::new(),
        _ => format!("// {file_name}\n// Created on {date}\n"),
    }
}

const HTML: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>New Project</title>
    <link rel="stylesheet" href="style.css">
</head>
<body>
    <main class="container">
        <h1>Hello, world</h1>
        <p>Start editing to see changes.</p>
    </main>
    <script src="script.js"></script>
</body>
</html>
"#;

const CSS: &str = r#"* {
    margin: 0;
    padding: 0;
    box-sizing: border-box;
}

body {
    font-family: system-ui, sans-serif;
    line-height: 1.6;
    color: #333;
}

.container {
    max-width: 960px;
    margin: 0 auto;
    padding: 2rem;
}
"#;

const JS: &str = r#"function greet(name) {
    return `Hello, ${name}!`;
}

document.addEventListener('DOMContentLoaded', () => {
    console.log(greet('world'));
});
"#;

const TS: &str = r#"interface Greeting {
    name: string;
    excited?: boolean;
}

export function greet({ name, excited = false }: Greeting): string {
    return `Hello, ${name}${excited ? '!' : '.'}`;
}
"#;

const JSX: &str = r#"import { useState } from 'react';

export default function Counter() {
    const [count, setCount] = useState(0);

    return (
        <button onClick={() => setCount(count + 1)}>
            Clicked {count} times
        </button>
    );
}
"#;

const PY: &str = r#"def greet(name: str) -> str:
    return f"Hello, {name}!"


if __name__ == "__main__":
    print(greet("world"))
"#;

const RS: &str = r#"fn main() {
    println!("Hello, world!");
}
"#;

const JSON: &str = r#"{
  "name": "new-project",
  "version": "0.1.0",
  "private": true
}
"#;
