//! Sampling normalizer (spec §4.D). Reproduced bit-for-bit against the
//! reference's GLM override table.

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SamplingParams {
    pub temperature: f64,
    pub top_p: f64,
    pub min_p: Option<f64>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RequestedSampling {
    pub temperature: Option<f64>,
    pub top_p: Option<f64>,
    pub min_p: Option<f64>,
}

const DEFAULT_TEMPERATURE: f64 = 0.7;
const DEFAULT_TOP_P: f64 = 0.9;

const GLM_TEMPERATURE: f64 = 0.7;
const GLM_TOP_P: f64 = 1.0;

/// `model-family → overrides`. Only one family is special-cased today; new
/// families plug in here without touching call sites.
pub fn normalize(model: &str, requested: RequestedSampling) -> SamplingParams {
    if is_glm_family(model) {
        return SamplingParams {
            temperature: GLM_TEMPERATURE,
            top_p: GLM_TOP_P,
            min_p: requested.min_p,
        };
    }
    SamplingParams {
        temperature: requested.temperature.unwrap_or(DEFAULT_TEMPERATURE),
        top_p: requested.top_p.unwrap_or(DEFAULT_TOP_P),
        min_p: requested.min_p,
    }
}

fn is_glm_family(model: &str) -> bool {
    // `model` may carry a `provider:` prefix; match against the underlying id.
    let underlying = model.split_once(':').map(|(_, m)| m).unwrap_or(model);
    underlying.starts_with("glm")
}
