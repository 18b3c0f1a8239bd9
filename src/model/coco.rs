// 该文件是 Kanjian （看见） 项目的一部分。
// src/model/coco.rs - COCO 类别标签
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use super::WithLabel;

/// COCO 数据集类别名称
pub const COCO_CLASSES: [&str; 80] = [
  "person", "bicycle", "car", "motorcycle", "airplane", "bus", "train", "truck", "boat",
  "traffic light", "fire hydrant", "stop sign", "parking meter", "bench", "bird", "cat", "dog",
  "horse", "sheep", "cow", "elephant", "bear", "zebra", "giraffe", "backpack", "umbrella",
  "handbag", "tie", "suitcase", "frisbee", "skis", "snowboard", "sports ball", "kite",
  "baseball bat", "baseball glove", "skateboard", "surfboard", "tennis racket", "bottle",
  "wine glass", "cup", "fork", "knife", "spoon", "bowl", "banana", "apple", "sandwich", "orange",
  "broccoli", "carrot", "hot dog", "pizza", "donut", "cake", "chair", "couch", "potted plant",
  "bed", "dining table", "toilet", "tv", "laptop", "mouse", "remote", "keyboard", "cell phone",
  "microwave", "oven", "toaster", "sink", "refrigerator", "book", "clock", "vase", "scissors",
  "teddy bear", "hair drier", "toothbrush",
];

/// COCO 类别，保存原始类别索引
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CocoLabel(u32);

impl WithLabel for CocoLabel {
  fn to_label_str(&self) -> String {
    match COCO_CLASSES.get(self.0 as usize) {
      Some(name) => (*name).to_string(),
      None => format!("class_{}", self.0),
    }
  }

  fn to_label_id(&self) -> u32 {
    self.0
  }

  fn from_label_id(id: u32) -> Self {
    CocoLabel(id)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn known_ids_map_to_coco_names() {
    assert_eq!(CocoLabel::from_label_id(0).to_label_str(), "person");
    assert_eq!(CocoLabel::from_label_id(15).to_label_str(), "cat");
    assert_eq!(CocoLabel::from_label_id(79).to_label_str(), "toothbrush");
  }

  #[test]
  fn unknown_id_keeps_its_index() {
    let label = CocoLabel::from_label_id(80);
    assert_eq!(label.to_label_id(), 80);
    assert_eq!(label.to_label_str(), "class_80");
  }
}
