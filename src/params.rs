//! Trainable parameters and selection of what an optimizer updates.

use std::cell::{Cell, Ref, RefCell, RefMut};
use std::rc::Rc;
use std::str::FromStr;

use ndarray::{ArrayD, Dimension, IxDyn};

use crate::error::{Error, Result};

#[derive(Debug)]
struct ParamInner {
    data: RefCell<ArrayD<f32>>,
    grad: RefCell<ArrayD<f32>>,
    requires_grad: Cell<bool>,
}

/// Shared handle to a trainable array and its gradient.
///
/// Cloning a `Param` yields another handle to the same storage, so a model
/// and an optimizer can both hold it. Data and gradient borrow
/// independently.
#[derive(Debug, Clone)]
pub struct Param {
    inner: Rc<ParamInner>,
}

impl Param {
    /// Wrap an array as a parameter that requires gradients.
    #[must_use]
    pub fn new<D: Dimension>(data: ndarray::Array<f32, D>) -> Self {
        let data = data.into_dyn();
        let grad = ArrayD::zeros(data.raw_dim());
        Self {
            inner: Rc::new(ParamInner {
                data: RefCell::new(data),
                grad: RefCell::new(grad),
                requires_grad: Cell::new(true),
            }),
        }
    }

    /// Wrap an array that is not trained unless selected explicitly.
    #[must_use]
    pub fn frozen<D: Dimension>(data: ndarray::Array<f32, D>) -> Self {
        let param = Self::new(data);
        param.set_requires_grad(false);
        param
    }

    pub fn data(&self) -> Ref<'_, ArrayD<f32>> {
        self.inner.data.borrow()
    }

    pub fn data_mut(&self) -> RefMut<'_, ArrayD<f32>> {
        self.inner.data.borrow_mut()
    }

    pub fn grad(&self) -> Ref<'_, ArrayD<f32>> {
        self.inner.grad.borrow()
    }

    pub fn grad_mut(&self) -> RefMut<'_, ArrayD<f32>> {
        self.inner.grad.borrow_mut()
    }

    #[must_use]
    pub fn requires_grad(&self) -> bool {
        self.inner.requires_grad.get()
    }

    pub fn set_requires_grad(&self, requires_grad: bool) {
        self.inner.requires_grad.set(requires_grad);
    }

    /// Add `grad` into the stored gradient when gradients are tracked.
    ///
    /// # Errors
    ///
    /// Returns an error if the shapes differ.
    pub fn accumulate_grad<D: Dimension>(&self, grad: &ndarray::Array<f32, D>) -> Result<()> {
        if !self.requires_grad() {
            return Ok(());
        }
        let mut stored = self.grad_mut();
        if stored.shape() != grad.shape() {
            return Err(Error::ShapeMismatch {
                expected: format!("{:?}", stored.shape()),
                actual: format!("{:?}", grad.shape()),
            });
        }
        *stored += &grad.view().into_dyn();
        Ok(())
    }

    pub fn zero_grad(&self) {
        self.grad_mut().fill(0.0);
    }

    /// Number of scalar values held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn shape(&self) -> IxDyn {
        self.data().raw_dim()
    }

    /// Whether two handles refer to the same storage.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

/// Anything that exposes trainable parameters.
pub trait Module {
    /// Handles to every parameter of the module.
    fn parameters(&self) -> Vec<Param>;
}

/// A group of parameters an optimizer may update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptTarget {
    /// The network weights.
    Net,
    /// The downsampler weights.
    Down,
    /// The network input itself.
    Input,
}

impl FromStr for OptTarget {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "net" => Ok(Self::Net),
            "down" => Ok(Self::Down),
            "input" => Ok(Self::Input),
            other => Err(Error::UnknownOptTarget(other.to_string())),
        }
    }
}

/// Parse a comma separated target list such as `"net,input"`.
///
/// # Errors
///
/// Returns an error for any unrecognised entry.
pub fn parse_opt_over(opt_over: &str) -> Result<Vec<OptTarget>> {
    opt_over.split(',').map(|s| s.trim().parse()).collect()
}

/// Collect the parameters to optimize over.
///
/// `opt_over` is a comma separated list of `net`, `down` and `input`,
/// processed in order. `down` replaces everything selected before it with
/// the downsampler parameters, so `"net,down"` optimizes only the
/// downsampler while `"down,net"` optimizes both. Selecting `input` turns
/// on gradient tracking for `net_input`.
///
/// # Errors
///
/// Returns an error for unknown targets, or when `down` is requested without
/// a downsampler.
pub fn get_params(
    opt_over: &str,
    net: &dyn Module,
    net_input: &Param,
    downsampler: Option<&dyn Module>,
) -> Result<Vec<Param>> {
    let mut params = Vec::new();

    for target in parse_opt_over(opt_over)? {
        match target {
            OptTarget::Net => params.extend(net.parameters()),
            OptTarget::Down => {
                let down = downsampler.ok_or(Error::MissingDownsampler)?;
                params = down.parameters();
            }
            OptTarget::Input => {
                net_input.set_requires_grad(true);
                params.push(net_input.clone());
            }
        }
    }

    tracing::debug!(
        "Optimizing over {opt_over:?}: {} tensors, {} values",
        params.len(),
        params.iter().map(Param::len).sum::<usize>()
    );

    Ok(params)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{Array1, Array2};

    struct Toy {
        weight: Param,
        bias: Param,
    }

    impl Module for Toy {
        fn parameters(&self) -> Vec<Param> {
            vec![self.weight.clone(), self.bias.clone()]
        }
    }

    fn toy() -> Toy {
        Toy {
            weight: Param::new(Array2::<f32>::zeros((2, 3))),
            bias: Param::new(Array1::<f32>::zeros(2)),
        }
    }

    #[test]
    fn test_params_share_storage() {
        let p = Param::new(Array1::<f32>::zeros(3));
        let q = p.clone();
        q.data_mut()[[1]] = 5.0;
        assert!((p.data()[[1]] - 5.0).abs() < 1e-6);
        assert!(p.ptr_eq(&q));
    }

    #[test]
    fn test_accumulate_and_zero_grad() {
        let p = Param::new(Array1::<f32>::zeros(2));
        p.accumulate_grad(&Array1::from_vec(vec![1.0, 2.0])).unwrap();
        p.accumulate_grad(&Array1::from_vec(vec![1.0, 2.0])).unwrap();
        assert!((p.grad()[[1]] - 4.0).abs() < 1e-6);

        p.zero_grad();
        assert!(p.grad().iter().all(|&g| g == 0.0));

        assert!(p.accumulate_grad(&Array1::<f32>::zeros(3)).is_err());
    }

    #[test]
    fn test_frozen_ignores_grad() {
        let p = Param::frozen(Array1::<f32>::zeros(2));
        p.accumulate_grad(&Array1::from_vec(vec![1.0, 1.0])).unwrap();
        assert!(p.grad().iter().all(|&g| g == 0.0));
    }

    #[test]
    fn test_select_net() {
        let net = toy();
        let input = Param::frozen(Array1::<f32>::zeros(4));
        let params = get_params("net", &net, &input, None).unwrap();

        assert_eq!(params.len(), 2);
        assert!(params[0].ptr_eq(&net.weight));
        assert!(!input.requires_grad());
    }

    #[test]
    fn test_select_net_and_input() {
        let net = toy();
        let input = Param::frozen(Array1::<f32>::zeros(4));
        let params = get_params("net,input", &net, &input, None).unwrap();

        assert_eq!(params.len(), 3);
        assert!(params[2].ptr_eq(&input));
        assert!(input.requires_grad());
    }

    #[test]
    fn test_select_down_replaces_earlier_targets() {
        let net = toy();
        let down = toy();
        let input = Param::frozen(Array1::<f32>::zeros(4));

        let params = get_params("net,down", &net, &input, Some(&down)).unwrap();
        assert_eq!(params.len(), 2);
        assert!(params[0].ptr_eq(&down.weight));
        assert!(params[1].ptr_eq(&down.bias));

        let params = get_params("down,net", &net, &input, Some(&down)).unwrap();
        assert_eq!(params.len(), 4);
        assert!(params[0].ptr_eq(&down.weight));
        assert!(params[2].ptr_eq(&net.weight));
    }

    #[test]
    fn test_down_without_downsampler() {
        let net = toy();
        let input = Param::frozen(Array1::<f32>::zeros(4));
        assert!(matches!(
            get_params("down", &net, &input, None),
            Err(Error::MissingDownsampler)
        ));
    }

    #[test]
    fn test_unknown_target() {
        let net = toy();
        let input = Param::frozen(Array1::<f32>::zeros(4));
        assert!(matches!(
            get_params("net,latent", &net, &input, None),
            Err(Error::UnknownOptTarget(t)) if t == "latent"
        ));
    }
}
