// ============================================================
// Layer 2 — Application / Use Cases
// ============================================================
// Coordinates the other layers to reach one goal: train a
// translation model, or translate with a trained one.
//
// Rules for this layer:
//   - No ML math or model code here
//   - No UI or printing here (that's Layer 1)
//   - No direct file formats here (that's Layer 4 and 6)

// Training workflow and its configuration
pub mod train_use_case;

// Single-sentence translation from a trained output directory
pub mod translate_use_case;
