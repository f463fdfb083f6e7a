use nalgebra::DVector;
use serde::{Deserialize, Serialize};

pub trait Optimizer: Send + Sync {
    fn update(&mut self, params: &mut DVector<f64>, gradients: &DVector<f64>);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OptimizerKind {
    Sgd,
    Adam,
}

impl OptimizerKind {
    pub fn build(&self, learning_rate: f64) -> Box<dyn Optimizer> {
        match self {
            OptimizerKind::Sgd => Box::new(Sgd::new(learning_rate)),
            OptimizerKind::Adam => Box::new(Adam::new(learning_rate, 0.9, 0.999, 1e-8)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Sgd {
    learning_rate: f64,
}

impl Sgd {
    pub fn new(learning_rate: f64) -> Self {
        Self { learning_rate }
    }
}

impl Optimizer for Sgd {
    fn update(&mut self, params: &mut DVector<f64>, gradients: &DVector<f64>) {
        *params -= gradients * self.learning_rate;
    }
}

#[derive(Debug, Clone)]
pub struct Adam {
    learning_rate: f64,
    beta1: f64,
    beta2: f64,
    epsilon: f64,
    t: i32,
    m: Option<DVector<f64>>,
    v: Option<DVector<f64>>,
}

impl Adam {
    pub fn new(learning_rate: f64, beta1: f64, beta2: f64, epsilon: f64) -> Self {
        Self {
            learning_rate,
            beta1,
            beta2,
            epsilon,
            t: 0,
            m: None,
            v: None,
        }
    }
}

impl Optimizer for Adam {
    fn update(&mut self, params: &mut DVector<f64>, gradients: &DVector<f64>) {
        self.t += 1;

        let m = self.m.get_or_insert_with(|| DVector::zeros(params.len()));
        let v = self.v.get_or_insert_with(|| DVector::zeros(params.len()));

        // Biased first and second moment estimates
        *m = m.scale(self.beta1) + gradients.scale(1.0 - self.beta1);
        *v = v.scale(self.beta2) + gradients.component_mul(gradients).scale(1.0 - self.beta2);

        let m_hat = m.scale(1.0 / (1.0 - self.beta1.powi(self.t)));
        let v_hat = v.scale(1.0 / (1.0 - self.beta2.powi(self.t)));

        let denominator = v_hat.map(|x| x.sqrt() + self.epsilon);
        let update = m_hat.component_div(&denominator).scale(self.learning_rate);

        *params -= update;
    }
}
