// 该文件是 Kanjian （看见） 项目的一部分。
// src/server/view.rs - 页面渲染
//
// 本文件根据 Apache 许可证第 2.0 版（以下简称“许可证”）授权使用；
// 除非遵守该许可证条款，否则您不得使用本文件。
// 您可通过以下网址获取许可证副本：
// http://www.apache.org/licenses/LICENSE-2.0
// 除非适用法律要求或书面同意，根据本许可协议分发的软件均按“原样”提供，
// 不附带任何形式的明示或暗示的保证或条件。
// 有关许可权限与限制的具体条款，请参阅本许可协议。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, Wareless Group

use std::fmt::Write;

use crate::task::PredictionView;

const PAGE_HEAD: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
  <meta charset="utf-8">
  <title>Kanjian Object Detection</title>
</head>
<body>
  <h1>Object Detection</h1>
  <form method="post" action="/" enctype="multipart/form-data">
    <input type="file" name="file" accept="image/*">
    <input type="submit" value="Upload">
  </form>
"#;

const PAGE_TAIL: &str = r#"  <h2>Live Camera</h2>
  <img src="/video_feed" alt="live detection stream">
</body>
</html>
"#;

/// 渲染首页，可附带检测结果或错误信息
pub fn render_index(view: &PredictionView, error: Option<&str>) -> String {
  let mut page = String::from(PAGE_HEAD);

  if let Some(message) = error {
    let _ = writeln!(page, "  <p class=\"error\">{}</p>", escape_html(message));
  }

  if let Some(image) = &view.output_image {
    let _ = writeln!(
      page,
      "  <img src=\"/static/{}\" alt=\"detection result\">",
      encode_path(image)
    );
  }

  if !view.predictions.is_empty() {
    page.push_str("  <ul>\n");
    for line in &view.predictions {
      let _ = writeln!(page, "    <li>{}</li>", escape_html(line));
    }
    page.push_str("  </ul>\n");
  }

  page.push_str(PAGE_TAIL);
  page
}

fn encode_path(path: &str) -> String {
  path
    .split('/')
    .map(|segment| urlencoding::encode(segment).into_owned())
    .collect::<Vec<_>>()
    .join("/")
}

fn escape_html(text: &str) -> String {
  let mut escaped = String::with_capacity(text.len());
  for c in text.chars() {
    match c {
      '&' => escaped.push_str("&amp;"),
      '<' => escaped.push_str("&lt;"),
      '>' => escaped.push_str("&gt;"),
      '"' => escaped.push_str("&quot;"),
      '\'' => escaped.push_str("&#39;"),
      _ => escaped.push(c),
    }
  }
  escaped
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn empty_view_is_just_the_form() {
    let page = render_index(&PredictionView::default(), None);
    assert!(page.contains("name=\"file\""));
    assert!(page.contains("<img src=\"/video_feed\""));
    assert!(!page.contains("/static/"));
    assert!(!page.contains("<li>"));
  }

  #[test]
  fn result_image_and_predictions_are_listed() {
    let view = PredictionView {
      output_image: Some("outputs/annotated_my cat.jpg".to_string()),
      predictions: vec![
        "cat, Confidence: 0.87".to_string(),
        "dog, Confidence: 0.30".to_string(),
      ],
    };
    let page = render_index(&view, None);

    assert!(page.contains("<img src=\"/static/outputs/annotated_my%20cat.jpg\""));
    let cat = page.find("<li>cat, Confidence: 0.87</li>").unwrap();
    let dog = page.find("<li>dog, Confidence: 0.30</li>").unwrap();
    assert!(cat < dog);
  }

  #[test]
  fn error_text_is_escaped() {
    let page = render_index(&PredictionView::default(), Some("<bad> & \"worse\""));
    assert!(page.contains("&lt;bad&gt; &amp; &quot;worse&quot;"));
  }
}
