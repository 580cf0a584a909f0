#![cfg(target_arch = "wasm32")]

use std::cell::RefCell;
use std::rc::Rc;

use anyhow::{Result, ensure};
use js_sys::{Reflect, Uint8Array};
use serde::{Deserialize, Serialize};
use serde_wasm_bindgen::{from_value, to_value};
use soilife_core::{
    Frame, FramePalette, Kernel, KernelCommand, KernelReply, ParamsPatch, SoilParams, StepReport,
    TickSummary,
};
use tracing::debug;
use wasm_bindgen::prelude::*;

/// Kernel handle owned by the worker script. Every call runs to completion
/// before the next one is accepted.
#[wasm_bindgen]
pub struct SimHandle {
    inner: Rc<RefCell<Kernel>>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
struct HandleOptions {
    params: SoilParams,
    palette: FramePalette,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct FrameHeader {
    width: u32,
    height: u32,
    generation: u64,
    alive_count: usize,
    total_fertility: f32,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct StepHeader {
    generation: u64,
    alive_count: usize,
    births: usize,
    deaths: usize,
    total_fertility: f32,
}

impl From<&TickSummary> for StepHeader {
    fn from(summary: &TickSummary) -> Self {
        Self {
            generation: summary.generation.0,
            alive_count: summary.alive_count,
            births: summary.births,
            deaths: summary.deaths,
            total_fertility: summary.total_fertility,
        }
    }
}

#[wasm_bindgen]
impl SimHandle {
    /// Allocates a grid and returns its first frame.
    #[wasm_bindgen(js_name = init)]
    pub fn init_js(&self, width: u32, height: u32) -> Result<JsValue, JsValue> {
        let frame = self
            .inner
            .borrow_mut()
            .init(width, height)
            .map_err(js_error)?;
        encode_frame(frame)
    }

    /// Advances one generation; `undefined` before init.
    #[wasm_bindgen(js_name = step)]
    pub fn step_js(&self) -> Result<JsValue, JsValue> {
        match self.inner.borrow_mut().step() {
            Some(report) => encode_step(report),
            None => Ok(JsValue::UNDEFINED),
        }
    }

    #[wasm_bindgen(js_name = render)]
    pub fn render_js(&self) -> Result<JsValue, JsValue> {
        encode_optional(self.inner.borrow().render())
    }

    #[wasm_bindgen(js_name = setCell)]
    pub fn set_cell_js(&self, x: u32, y: u32, value: u8) {
        self.inner.borrow_mut().set_cell(x, y, value != 0);
    }

    #[wasm_bindgen(js_name = clear)]
    pub fn clear_js(&self) -> Result<JsValue, JsValue> {
        encode_optional(self.inner.borrow_mut().clear())
    }

    #[wasm_bindgen(js_name = reset)]
    pub fn reset_js(&self) -> Result<JsValue, JsValue> {
        encode_optional(self.inner.borrow_mut().reset())
    }

    #[wasm_bindgen(js_name = resetSoil)]
    pub fn reset_soil_js(&self) -> Result<JsValue, JsValue> {
        encode_optional(self.inner.borrow_mut().reset_soil())
    }

    #[wasm_bindgen(js_name = randomize)]
    pub fn randomize_js(&self, density: f64, seed: Option<f64>) -> Result<JsValue, JsValue> {
        let seed = normalize_seed(seed).map_err(js_error)?;
        encode_optional(self.inner.borrow_mut().randomize(density, seed))
    }

    /// Merges a partial `{ f0, tau, sigma, alpha, beta, kappa, d, delta, w0 }` object.
    #[wasm_bindgen(js_name = setParameters)]
    pub fn set_parameters_js(&self, patch: JsValue) -> Result<(), JsValue> {
        let patch: ParamsPatch = from_value(patch).map_err(js_error)?;
        self.inner.borrow_mut().set_parameters(&patch);
        Ok(())
    }

    #[wasm_bindgen(js_name = parameters)]
    pub fn parameters_js(&self) -> Result<JsValue, JsValue> {
        to_value(self.inner.borrow().params()).map_err(js_error)
    }

    /// Applies a tagged `{ type: "...", ... }` message as posted to the worker.
    #[wasm_bindgen(js_name = dispatch)]
    pub fn dispatch_js(&self, message: JsValue) -> Result<JsValue, JsValue> {
        let command: KernelCommand = from_value(message).map_err(js_error)?;
        debug!(?command, "dispatching worker message");
        let reply = self.inner.borrow_mut().apply(command).map_err(js_error)?;
        match reply {
            KernelReply::Frame(frame) => encode_frame(frame),
            KernelReply::Stepped(report) => encode_step(report),
            KernelReply::Ack | KernelReply::Ignored => Ok(JsValue::UNDEFINED),
        }
    }
}

/// Creates an uninitialized kernel. `options` may carry `params` and `palette`.
#[wasm_bindgen]
pub fn create_kernel(options: JsValue) -> Result<SimHandle, JsValue> {
    let options = if options.is_null() || options.is_undefined() {
        HandleOptions::default()
    } else {
        from_value::<HandleOptions>(options).map_err(js_error)?
    };
    options.params.validate().map_err(js_error)?;
    let kernel = Kernel::with_params(options.params).with_palette(options.palette);
    Ok(SimHandle {
        inner: Rc::new(RefCell::new(kernel)),
    })
}

#[wasm_bindgen]
pub fn version() -> String {
    format!("soilife-web {}", env!("CARGO_PKG_VERSION"))
}

#[wasm_bindgen]
pub fn default_parameters() -> Result<JsValue, JsValue> {
    to_value(&SoilParams::default()).map_err(js_error)
}

/// Moves the frame's pixels into a fresh `Uint8Array` attached to a header
/// object. The frame is consumed, so no Rust-side copy outlives the call.
fn encode_frame(frame: Frame) -> Result<JsValue, JsValue> {
    let header = FrameHeader {
        width: frame.width,
        height: frame.height,
        generation: frame.generation.0,
        alive_count: frame.alive_count,
        total_fertility: frame.total_fertility,
    };
    let value = to_value(&header).map_err(js_error)?;
    let pixels = Uint8Array::from(frame.pixels.as_slice());
    set_field(&value, "pixels", &pixels.into())?;
    Ok(value)
}

fn encode_step(report: StepReport) -> Result<JsValue, JsValue> {
    let summary = to_value(&StepHeader::from(&report.summary)).map_err(js_error)?;
    let value = encode_frame(report.frame)?;
    set_field(&value, "summary", &summary)?;
    Ok(value)
}

fn encode_optional(frame: Option<Frame>) -> Result<JsValue, JsValue> {
    match frame {
        Some(frame) => encode_frame(frame),
        None => Ok(JsValue::UNDEFINED),
    }
}

fn set_field(target: &JsValue, key: &str, value: &JsValue) -> Result<(), JsValue> {
    Reflect::set(target, &JsValue::from_str(key), value)?;
    Ok(())
}

fn normalize_seed(seed: Option<f64>) -> Result<u64> {
    let Some(value) = seed else {
        return Ok(js_sys::Date::now() as u64);
    };
    ensure!(value.is_finite(), "seed must be a finite number");
    ensure!(value >= 0.0, "seed must be non-negative");
    let truncated = value.floor();
    ensure!(
        truncated <= u64::MAX as f64,
        "seed must be representable as u64"
    );
    Ok(truncated as u64)
}

fn js_error(err: impl std::fmt::Display) -> JsValue {
    JsError::new(&err.to_string()).into()
}
