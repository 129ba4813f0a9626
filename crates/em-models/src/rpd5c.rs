//! The rpd5c model: the PD-dependent rate law of rpd5 with stateless,
//! on-the-fly PD evaluation and a discrete likelihood sum.
//!
//! Four parameters with the same meaning as rpd5.

use crate::Model;
use em_core::{Params, Real, Result, Time};
use em_math::accumulators::LogSum;
use em_math::distributions::trunc_exp;
use em_math::integrals::MuIntegral;
use em_math::random_numbers::Reng;
use em_tree::{Node, Tree};

/// Phylogenetic-diversity-dependent birth–death model (stateless).
#[derive(Debug, Default, Clone, Copy)]
pub struct Rpd5c;

/// Rate from a node's recorded `pd` column.
fn speciation_rate(pars: &[Real], node: &Node) -> Real {
    (pars[1] + pars[2] * node.n + pars[3] * node.pd / node.n).max(0.0)
}

impl Model for Rpd5c {
    type State = ();

    fn description(&self) -> &'static str {
        "rpd5c model"
    }

    fn is_threadsafe(&self) -> bool {
        true
    }

    fn nparams(&self) -> usize {
        4
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
        let node = tree.node_at(t);
        let pd = tree.pd_at(t);
        Ok((pars[1] + pars[2] * node.n + pars[3] * pd / node.n).max(0.0))
    }

    fn nh_rate(
        &self,
        state: &mut Option<()>,
        t: Time,
        pars: &[Real],
        tree: &Tree,
    ) -> Result<Real> {
        let node = tree.node_at(t);
        let lambda = self.speciation_rate(state, t, pars, tree)?;
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

    fn sampling_prob(&self, _state: &mut Option<()>, pars: &[Real], tree: &Tree) -> Result<Real> {
        let mut muint = MuIntegral::new(pars[0], tree.present_time());
        let mut inte = 0.0;
        let mut logg = 0.0;
        let mut prev_brts = 0.0;
        let mut tips = tree[0].n;
        let mut ne = 0.0;
        for node in tree {
            let lambda = speciation_rate(pars, node);
            inte += node.n * lambda * muint.integrate(prev_brts, node.brts);
            if node.is_tip() {
                tips += 1.0;
            }
            if node.is_extinction() {
                ne -= 1.0;
            }
            if node.is_missing() {
                let lifespan = node.t_ext - node.brts;
                logg += (node.n * pars[0] * lambda).ln() - pars[0] * lifespan - (2.0 * tips + ne).ln();
                ne += 1.0;
            }
            prev_brts = node.brts;
        }
        Ok(logg - inte)
    }

    fn loglik(&self, _state: &mut Option<()>, pars: &[Real], tree: &Tree) -> Result<Real> {
        let mut log_sr = LogSum::default();
        let mut cex = 0;
        let mut inte = 0.0;
        let mut prev_brts = 0.0;
        let last = tree.len() - 1;
        for (i, node) in tree.iter().enumerate() {
            let sr = speciation_rate(pars, node);
            if node.is_extinction() {
                cex += 1;
            } else if i != last {
                log_sr += sr;
            }
            inte += (node.brts - prev_brts) * node.n * (sr + pars[0]);
            prev_brts = node.brts;
        }
        Ok(pars[0].ln() * cex as Real + log_sr.result() - inte)
    }

    fn lower_bound(&self) -> Params {
        vec![10e-9, 10e-9, -100.0, -100.0]
    }

    fn upper_bound(&self) -> Params {
        vec![100.0, 100.0, 100.0, 100.0]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn tree_with_missing() -> Tree {
        let mut tree = Tree::from_branching_times(&[6.0, 5.0, 4.0, 3.0, 2.0, 1.0], 2.0).unwrap();
        tree.insert_species(1.5, 3.5);
        tree.calculate_pd();
        tree
    }

    #[test]
    fn matches_rpd1_when_pd_term_is_zero() {
        let model = Rpd5c;
        let rpd1 = crate::Rpd1;
        let pars4 = [0.15, 0.5, -0.02, 0.0];
        let pars3 = [0.15, 0.5, -0.02];
        let tree = tree_with_missing();
        for t in [0.7, 2.2, 4.9] {
            let a = model.nh_rate(&mut None, t, &pars4, &tree).unwrap();
            let b = rpd1.nh_rate(&mut None, t, &pars3, &tree).unwrap();
            assert_relative_eq!(a, b, max_relative = 1e-12);
        }
        let a = model.intensity(&mut None, &pars4, &tree).unwrap();
        let b = rpd1.intensity(&mut None, &pars3, &tree).unwrap();
        assert_relative_eq!(a, b, max_relative = 1e-12);
    }

    #[test]
    fn loglik_skips_final_tip_rate() {
        let model = Rpd5c;
        let pars = [0.1, 0.5, 0.0, 0.0];
        let tree = Tree::from_branching_times(&[4.0, 3.0, 2.0, 1.0], 2.0).unwrap();
        // constant rate 0.5; 3 of 4 nodes contribute log-rates
        let mut inte = 0.0;
        let mut prev = 0.0;
        for node in &tree {
            inte += (node.brts - prev) * node.n * 0.6;
            prev = node.brts;
        }
        let expected = 3.0 * 0.5_f64.ln() - inte;
        let got = model.loglik(&mut None, &pars, &tree).unwrap();
        assert_relative_eq!(got, expected, max_relative = 1e-10);
    }

    #[test]
    fn sampling_prob_finite_with_missing_nodes() {
        let model = Rpd5c;
        let pars = [0.2, 0.6, 0.01, 0.02];
        let tree = tree_with_missing();
        let logg = model.sampling_prob(&mut None, &pars, &tree).unwrap();
        assert!(logg.is_finite());
    }

    #[test]
    fn pd_term_raises_the_rate() {
        let model = Rpd5c;
        let tree = tree_with_missing();
        let with_pd = model
            .speciation_rate(&mut None, 4.0, &[0.1, 0.5, 0.0, 0.1], &tree)
            .unwrap();
        let without = model
            .speciation_rate(&mut None, 4.0, &[0.1, 0.5, 0.0, 0.0], &tree)
            .unwrap();
        assert!(with_pd > without);
    }
}
