//! Small combinatorial helpers shared by the two rule synthesisers (C6,
//! C7): choosing symbol subsets for a tree's argument slots and
//! rendering a tree with its local slots remapped onto chosen symbols.

use autoinf_ast::Expr;

/// Every size-`k` subset of `0..n`, in ascending lexicographic order.
pub(crate) fn k_subsets(n: usize, k: usize) -> Vec<Vec<usize>> {
    if k == 0 {
        return vec![Vec::new()];
    }
    if k > n {
        return Vec::new();
    }
    let mut result = Vec::new();
    let mut combo: Vec<usize> = (0..k).collect();
    loop {
        result.push(combo.clone());
        let mut i = k;
        loop {
            if i == 0 {
                return result;
            }
            i -= 1;
            if combo[i] != i + n - k {
                break;
            }
            if i == 0 {
                return result;
            }
        }
        combo[i] += 1;
        for j in (i + 1)..k {
            combo[j] = combo[j - 1] + 1;
        }
    }
}

/// Map a tree's local argument indices, in order of first appearance
/// within `arg_mask`, onto the chosen `subset` (also in ascending
/// order). The result has length `input_arity`; slots the tree never
/// references keep the placeholder value `0` and are never read.
pub(crate) fn expand_permutation(arg_mask: u64, subset: &[usize], input_arity: usize) -> Vec<usize> {
    let mut permutation = vec![0usize; input_arity];
    let mut subset_iter = subset.iter();
    for local in 0..64usize {
        if arg_mask & (1u64 << local) != 0 {
            if let Some(&target) = subset_iter.next() {
                if local < permutation.len() {
                    permutation[local] = target;
                }
            }
        }
    }
    permutation
}

/// Render `expr` with each local `s{i}` slot replaced by `s{permutation[i]}`.
pub(crate) fn substitute_symbols(expr: &Expr, permutation: &[usize]) -> String {
    match expr {
        Expr::Lit(v) => v.to_string(),
        Expr::Arg(i) => format!("s{}", permutation[*i]),
        Expr::Bin(op, l, r) => format!(
            "({}{}{})",
            substitute_symbols(l, permutation),
            op.symbol(),
            substitute_symbols(r, permutation)
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn k_subsets_of_size_zero_is_one_empty_subset() {
        assert_eq!(k_subsets(3, 0), vec![Vec::<usize>::new()]);
    }

    #[test]
    fn k_subsets_enumerates_in_order() {
        assert_eq!(
            k_subsets(4, 2),
            vec![
                vec![0, 1],
                vec![0, 2],
                vec![0, 3],
                vec![1, 2],
                vec![1, 3],
                vec![2, 3],
            ]
        );
    }

    #[test]
    fn expand_permutation_maps_bitmask_order() {
        // arg_mask has bits 0 and 2 set (the tree references Arg(0) and
        // Arg(2)); subset picks global symbols 3 and 5 for them in
        // ascending bit-position order.
        let permutation = expand_permutation(0b101, &[3, 5], 6);
        assert_eq!(permutation[0], 3);
        assert_eq!(permutation[2], 5);
    }
}
