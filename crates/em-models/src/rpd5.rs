//! The rpd5 model: speciation depends on diversity and on accumulated
//! phylogenetic diversity.
//!
//! Four parameters: `pars[0]` = μ, `pars[1]` = λ₀, `pars[2]` = diversity
//! coefficient, `pars[3]` = PD coefficient, so that
//! λ(t) = max(0, λ₀ + pars[2]·N + pars[3]·PD(t)/N).
//!
//! The cumulative-PD column is memoized per tree in the model state and
//! rebuilt lazily after each invalidation.

use crate::Model;
use em_core::{Params, Real, Result, Time};
use em_math::accumulators::LogSum;
use em_math::distributions::trunc_exp;
use em_math::integrals::MuIntegral;
use em_math::random_numbers::Reng;
use em_tree::{Node, Tree};

/// Phylogenetic-diversity-dependent birth–death model (memoized state).
#[derive(Debug, Default, Clone, Copy)]
pub struct Rpd5;

/// Cumulative PD per node, plus the value at the present as a final entry.
fn pd_vec<'a>(state: &'a mut Option<Vec<Real>>, tree: &Tree) -> &'a [Real] {
    let pd = state.get_or_insert_with(Vec::new);
    if pd.is_empty() {
        pd.reserve(tree.len() + 1);
        let mut sum = 0.0;
        let mut brts0 = 0.0;
        let mut ni = tree[0].n;
        for node in tree {
            if node.is_missing() {
                sum += (node.brts - brts0) * ni;
                ni += 1.0;
                brts0 = node.brts;
            }
            pd.push(sum);
        }
        sum += (tree.present_time() - brts0) * ni;
        pd.push(sum);
    }
    pd
}

/// Antiderivative of `(c1 + c2·t)·(1 − c3·exp(c4·t))`.
fn ind_rpd5(x: Real, c1: Real, c2: Real, c3: Real, c4: Real) -> Real {
    0.5 * (c2 * x * x) + c1 * x - (c3 * (c4 * x).exp() * (c2 * (c4 * x - 1.0) + c1 * c4)) / (c4 * c4)
}

/// Clip `[b0, b1]` to the part where `c1 + c2·t` is non-negative.
fn clip_positive(b0: Real, b1: Real, c1: Real, c2: Real) -> (Real, Real) {
    let r = -c1 / c2;
    if c2 > 0.0 {
        (b0.max(r.min(b1)), b1)
    } else {
        (b0, b1.min(r.max(b0)))
    }
}

impl Rpd5 {
    fn rate_at(&self, state: &mut Option<Vec<Real>>, t: Time, pars: &[Real], tree: &Tree) -> (Real, Real) {
        let pd = pd_vec(state, tree);
        let i = tree.nodes().partition_point(|nd| nd.brts < t);
        let p = pd[i];
        let n = tree[i.min(tree.len() - 1)].n;
        let lambda = (pars[1] + pars[2] * n + pars[3] * p / n).max(0.0);
        (lambda, n)
    }
}

impl Model for Rpd5 {
    type State = Vec<Real>;

    fn description(&self) -> &'static str {
        "rpd5 model"
    }

    fn is_threadsafe(&self) -> bool {
        true
    }

    fn nparams(&self) -> usize {
        4
    }

    fn invalidate_state(&self, state: &mut Option<Vec<Real>>) {
        state.get_or_insert_with(Vec::new).clear();
    }

    fn extinction_time(
        &self,
        _state: &mut Option<Vec<Real>>,
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
        state: &mut Option<Vec<Real>>,
        t: Time,
        pars: &[Real],
        tree: &Tree,
    ) -> Result<Real> {
        Ok(self.rate_at(state, t, pars, tree).0)
    }

    fn nh_rate(
        &self,
        state: &mut Option<Vec<Real>>,
        t: Time,
        pars: &[Real],
        tree: &Tree,
    ) -> Result<Real> {
        let (lambda, n) = self.rate_at(state, t, pars, tree);
        Ok(lambda * n * (1.0 - (-pars[0] * (tree.present_time() - t)).exp()))
    }

    fn intensity(&self, state: &mut Option<Vec<Real>>, pars: &[Real], tree: &Tree) -> Result<Real> {
        let max_brts = tree.present_time();
        let c2 = pars[3];
        let c3 = (-pars[0] * max_brts).exp();
        let c4 = pars[0];
        let pd = pd_vec(state, tree);
        let mut muint = MuIntegral::new(pars[0], max_brts);
        let mut sum_inte = 0.0;
        let mut prev_brts = 0.0;
        let mut prev_pd = 0.0;
        for (i, node) in tree.iter().enumerate() {
            if c2 == 0.0 {
                let lambda = (pars[1] + pars[2] * node.n).max(0.0);
                sum_inte += node.n * lambda * muint.integrate(prev_brts, node.brts);
            } else {
                // lambda is linear on the interval: c1 + c2 * t
                let c1 = pars[1] + pars[2] * node.n + pars[3] * ((prev_pd - node.n * prev_brts) / node.n);
                let (b0, b1) = clip_positive(prev_brts, node.brts, c1, c2);
                sum_inte += (ind_rpd5(b1, c1, c2, c3, c4) - ind_rpd5(b0, c1, c2, c3, c4)) * node.n;
            }
            prev_brts = node.brts;
            prev_pd = pd[i];
        }
        Ok(sum_inte)
    }

    fn loglik(&self, state: &mut Option<Vec<Real>>, pars: &[Real], tree: &Tree) -> Result<Real> {
        let pd = pd_vec(state, tree);
        let mut sum_inte = 0.0;
        let mut sum_rho = LogSum::default();
        let mut prev_brts = 0.0;
        let mut prev_pd = 0.0;
        let z3 = pars[3] == 0.0;
        for (i, node) in tree.iter().enumerate() {
            let wt = node.brts - prev_brts;
            let pd2 = prev_pd + node.n * wt;
            let lambda = pars[1] + pars[2] * node.n + pars[3] * pd2 / node.n;
            let to = if node.is_extinction() { 0.0 } else { 1.0 };
            sum_rho += lambda * to + pars[0] * (1.0 - to);
            let mut inte = node.n * (pars[0] * wt);
            if z3 {
                inte += node.n * (pars[1] + pars[2] * node.n).max(0.0) * wt;
            } else {
                let c1 = pars[1] + pars[2] * node.n + (pars[3] / node.n) * (prev_pd - prev_brts * node.n);
                let (b0, b1) = clip_positive(prev_brts, node.brts, c1, pars[3]);
                inte += node.n * (c1 * (b1 - b0) + 0.5 * pars[3] * (b1 * b1 - b0 * b0));
            }
            sum_inte += inte;
            prev_brts = node.brts;
            prev_pd = pd[i];
        }
        Ok(sum_rho.result() - sum_inte)
    }

    fn sampling_prob(&self, state: &mut Option<Vec<Real>>, pars: &[Real], tree: &Tree) -> Result<Real> {
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
        let mut tmp: Option<Vec<Real>> = None;
        self.invalidate_state(&mut tmp);
        for (i, node) in mtree.iter().enumerate() {
            let lambda = self.speciation_rate(&mut tmp, node.brts, pars, &mtree)?;
            let lifespan = node.t_ext - node.brts;
            let (n_b, n_o, n_e) = nnn[i];
            logg += (n_b * pars[0] * lambda).ln() - pars[0] * lifespan - (2.0 * n_o + n_e).ln();
        }
        self.invalidate_state(state);
        Ok(logg)
    }

    fn lower_bound(&self) -> Params {
        vec![10e-9, 10e-9, -Real::MAX, -Real::MAX]
    }

    fn upper_bound(&self) -> Params {
        vec![Real::MAX, Real::MAX, Real::MAX, Real::MAX]
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
    fn memoized_pd_column_matches_tree_column() {
        let tree = tree_with_missing();
        let mut state: Option<Vec<Real>> = None;
        let pd = pd_vec(&mut state, &tree);
        assert_eq!(pd.len(), tree.len() + 1);
        for (i, node) in tree.iter().enumerate() {
            assert_relative_eq!(pd[i], node.pd);
        }
    }

    #[test]
    fn invalidation_forces_recomputation() {
        let model = Rpd5;
        let pars = [0.2, 0.4, 0.0, 0.05];
        let mut tree = tree_with_missing();
        let mut state: Option<Vec<Real>> = None;
        let before = model.speciation_rate(&mut state, 2.0, &pars, &tree).unwrap();
        // mutate the tree: without invalidation the memo would be stale
        tree.insert_species(0.5, 5.5);
        tree.calculate_pd();
        model.invalidate_state(&mut state);
        let after = model.speciation_rate(&mut state, 2.0, &pars, &tree).unwrap();
        assert!(after > before, "pd grew, so the rate must grow");
    }

    #[test]
    fn reduces_to_linear_model_when_pd_term_is_zero() {
        let model = Rpd5;
        let rpd1 = crate::Rpd1;
        let pars5 = [0.15, 0.5, -0.02, 0.0];
        let pars1 = [0.15, 0.5, -0.02];
        let tree = tree_with_missing();
        let mut state: Option<Vec<Real>> = None;
        for t in [0.7, 2.2, 4.9] {
            let a = model.nh_rate(&mut state, t, &pars5, &tree).unwrap();
            let b = rpd1.nh_rate(&mut None, t, &pars1, &tree).unwrap();
            assert_relative_eq!(a, b, max_relative = 1e-12);
        }
        let a = model.intensity(&mut state, &pars5, &tree).unwrap();
        let b = rpd1.intensity(&mut None, &pars1, &tree).unwrap();
        assert_relative_eq!(a, b, max_relative = 1e-10);
    }

    #[test]
    fn loglik_is_finite_for_positive_rates() {
        let model = Rpd5;
        let pars = [0.2, 0.6, 0.01, 0.02];
        let tree = tree_with_missing();
        let mut state: Option<Vec<Real>> = None;
        let ll = model.loglik(&mut state, &pars, &tree).unwrap();
        assert!(ll.is_finite());
    }

    #[test]
    fn sampling_prob_finite_with_missing_nodes() {
        let model = Rpd5;
        let pars = [0.2, 0.6, 0.01, 0.02];
        let tree = tree_with_missing();
        let mut state: Option<Vec<Real>> = None;
        let logg = model.sampling_prob(&mut state, &pars, &tree).unwrap();
        assert!(logg.is_finite());
    }
}
