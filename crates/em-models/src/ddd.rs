//! The DDD model: diversity-dependent diversification with linear rates.
//!
//! Three parameters: `pars[0]` = μ, `pars[1]` = λ₀, `pars[2]` = diversity
//! coefficient.  Shares rpd1's rate law but carries its own integrated
//! intensity and likelihood accounting.

use crate::Model;
use em_core::{Params, Real, Result, Time};
use em_math::accumulators::LogSum;
use em_math::distributions::trunc_exp;
use em_math::random_numbers::Reng;
use em_tree::{Node, Tree};

/// Diversity-dependent birth–death model.
#[derive(Debug, Default, Clone, Copy)]
pub struct Ddd;

fn speciation_rate(pars: &[Real], node: &Node) -> Real {
    (pars[1] + pars[2] * node.n).max(0.0)
}

impl Model for Ddd {
    type State = ();

    fn description(&self) -> &'static str {
        "DDD model"
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
        let max_brts = tree.present_time();
        let exp_max_term = (-pars[0] * max_brts).exp() / pars[0];
        let mut exp_brts_m1_term = 1.0;
        let mut prev_brts = 0.0;
        let mut sum_sigma = 0.0;
        for node in tree {
            let lambda = speciation_rate(pars, node);
            let wt = node.brts - prev_brts;
            let exp_brts_term = (pars[0] * node.brts).exp();
            sum_sigma += node.n * lambda * (wt - exp_max_term * (exp_brts_term - exp_brts_m1_term));
            exp_brts_m1_term = exp_brts_term;
            prev_brts = node.brts;
        }
        Ok(sum_sigma)
    }

    fn sampling_prob(&self, state: &mut Option<()>, pars: &[Real], tree: &Tree) -> Result<Real> {
        let mut logg = -self.intensity(state, pars, tree)?;
        let mut mtree: Vec<Node> = Vec::new();
        let mut nnn: Vec<(Real, Real, Real)> = Vec::new();
        let mut nb = 0.0;
        let mut no = tree[0].n;
        let mut ne = 0.0;
        for node in tree {
            if node.is_missing() {
                nnn.push((node.n, no, nb - ne));
                mtree.push(*node);
            }
            if node.is_extinction() {
                ne += 1.0;
            }
            if node.is_tip() {
                no += 1.0;
            }
            if node.is_missing() {
                nb += 1.0;
            }
        }
        let mtree = Tree::from_nodes(mtree);
        for (i, node) in mtree.iter().enumerate() {
            let lambda = self.speciation_rate(state, node.brts, pars, &mtree)?;
            let lifespan = node.t_ext - node.brts;
            let (n_b, n_o, n_e) = nnn[i];
            logg += (n_b * pars[0] * lambda).ln() - pars[0] * lifespan - (2.0 * n_o + n_e).ln();
        }
        Ok(logg)
    }

    fn loglik(&self, _state: &mut Option<()>, pars: &[Real], tree: &Tree) -> Result<Real> {
        let mut sum_inte = 0.0;
        let mut sum_rho = LogSum::default();
        let mut prev_sum_rho = LogSum::default();
        let mut prev_brts = 0.0;
        for node in tree {
            let wt = node.brts - prev_brts;
            let lambda = speciation_rate(pars, node);
            sum_inte += node.n * (pars[0] + lambda) * wt;
            prev_sum_rho = sum_rho.clone();
            let to = if node.is_extinction() { 0.0 } else { 1.0 };
            sum_rho += lambda * to + pars[0] * (1.0 - to);
            prev_brts = node.brts;
        }
        Ok(prev_sum_rho.result() - sum_inte)
    }

    fn lower_bound(&self) -> Params {
        vec![10e-9, 10e-9, -1.0]
    }

    fn upper_bound(&self) -> Params {
        vec![Real::MAX, Real::MAX, Real::MAX]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn four_tip_tree() -> Tree {
        Tree::from_branching_times(&[4.0, 3.0, 2.0, 1.0], 2.0).unwrap()
    }

    #[test]
    fn intensity_matches_direct_integral() {
        // with lambda constant, the intensity is
        //   sum_i n_i * lambda * Int_{t_{i-1}}^{t_i} (1 - e^{-mu (T - t)}) dt
        let model = Ddd;
        let pars = [0.3, 0.7, 0.0];
        let tree = four_tip_tree();
        let t_end = tree.present_time();
        let mut expected = 0.0;
        let mut prev = 0.0;
        for node in &tree {
            let s = 1.0 / (pars[0] * (pars[0] * t_end).exp());
            let inte = (node.brts - prev)
                - s * ((pars[0] * node.brts).exp() - (pars[0] * prev).exp());
            expected += node.n * 0.7 * inte;
            prev = node.brts;
        }
        let got = model.intensity(&mut None, &pars, &tree).unwrap();
        assert_relative_eq!(got, expected, max_relative = 1e-10);
    }

    #[test]
    fn loglik_excludes_final_node_rate() {
        let model = Ddd;
        let pars = [0.1, 0.5, 0.0];
        let tree = four_tip_tree();
        // rates for the first 3 of 4 nodes, integral over all nodes
        let mut inte = 0.0;
        let mut prev = 0.0;
        for node in &tree {
            inte += node.n * 0.6 * (node.brts - prev);
            prev = node.brts;
        }
        let expected = 3.0 * 0.5_f64.ln() - inte;
        let got = model.loglik(&mut None, &pars, &tree).unwrap();
        assert_relative_eq!(got, expected, max_relative = 1e-10);
    }

    #[test]
    fn sampling_prob_finite_with_missing_nodes() {
        let model = Ddd;
        let pars = [0.2, 0.8, -0.01];
        let mut tree = four_tip_tree();
        tree.insert_species(0.5, 2.5);
        tree.calculate_pd();
        let logg = model.sampling_prob(&mut None, &pars, &tree).unwrap();
        assert!(logg.is_finite());
    }
}
