//! The rpd1 model: linear diversity-dependent speciation, constant
//! extinction.
//!
//! Three parameters: `pars[0]` = μ, `pars[1]` = λ₀, `pars[2]` = diversity
//! coefficient, so that λ(N) = max(0, λ₀ + pars[2]·N).

use crate::Model;
use em_core::{Params, Real, Result, Time};
use em_math::accumulators::LogSum;
use em_math::distributions::trunc_exp;
use em_math::integrals::MuIntegral;
use em_math::random_numbers::Reng;
use em_tree::{Node, Tree};

/// Linear diversity-dependent birth–death model.
#[derive(Debug, Default, Clone, Copy)]
pub struct Rpd1;

fn speciation_rate(pars: &[Real], node: &Node) -> Real {
    (pars[1] + pars[2] * node.n).max(0.0)
}

impl Model for Rpd1 {
    type State = ();

    fn description(&self) -> &'static str {
        "rpd1 model"
    }

    fn is_threadsafe(&self) -> bool {
        true
    }

    fn nparams(&self) -> usize {
        3
    }

    fn extinction_time(
        &self,
        _state: &mut Option<()>,
        t_spec: Time,
        pars: &[Real],
        tree: &Tree,
        rng: &mut Reng,
    ) -> Result<Real> {
        let t_end = tree.present_time();
        Ok(t_spec + trunc_exp(0.0, t_end - t_spec, pars[0], rng)?)
    }

    fn speciation_rate(
        &self,
        _state: &mut Option<()>,
        t: Time,
        pars: &[Real],
        tree: &Tree,
    ) -> Result<Real> {
        Ok(speciation_rate(pars, tree.node_at(t)))
    }

    fn nh_rate(
        &self,
        _state: &mut Option<()>,
        t: Time,
        pars: &[Real],
        tree: &Tree,
    ) -> Result<Real> {
        let node = tree.node_at(t);
        let lambda = speciation_rate(pars, node);
        Ok(lambda * node.n * (1.0 - (-pars[0] * (tree.present_time() - t)).exp()))
    }

    fn intensity(&self, _state: &mut Option<()>, pars: &[Real], tree: &Tree) -> Result<Real> {
        let mut muint = MuIntegral::new(pars[0], tree.present_time());
        let mut inte = 0.0;
        let mut prev_brts = 0.0;
        for node in tree {
            let lambda = speciation_rate(pars, node);
            inte += node.n * lambda * muint.integrate(prev_brts, node.brts);
            prev_brts = node.brts;
        }
        Ok(inte)
    }

    fn sampling_prob(&self, state: &mut Option<()>, pars: &[Real], tree: &Tree) -> Result<Real> {
        let mut logg = -self.intensity(state, pars, tree)?;
        let mut tips = tree[0].n;
        for node in tree {
            if node.is_tip() {
                tips += 1.0;
            }
            if node.is_missing() {
                let lambda = speciation_rate(pars, node);
                let lifespan = node.t_ext - node.brts;
                logg += (node.n * pars[0] * lambda).ln() - pars[0] * lifespan - (node.n + tips).ln();
            }
        }
        Ok(logg)
    }

    fn loglik(&self, _state: &mut Option<()>, pars: &[Real], tree: &Tree) -> Result<Real> {
        let mut log_sr = LogSum::default();
        let mut cex = 0;
        let mut inte = 0.0;
        let mut prev_brts = 0.0;
        for node in tree {
            let sr = speciation_rate(pars, node);
            if node.is_extinction() {
                cex += 1;
            } else {
                log_sr += sr;
            }
            inte += (node.brts - prev_brts) * node.n * (sr + pars[0]);
            prev_brts = node.brts;
        }
        Ok(pars[0].ln() * cex as Real + log_sr.result() - inte)
    }

    fn lower_bound(&self) -> Params {
        vec![10e-9, 10e-9, -1.0]
    }

    fn upper_bound(&self) -> Params {
        vec![Real::MAX, Real::MAX, Real::MAX]
    }
}
