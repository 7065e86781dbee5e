use std::collections::VecDeque;

use dazrig_api_core::BoneSpec;
use hashbrown::HashMap;

/// Parent-first bone order (indices into `bones`), stable with respect to
/// declaration order. Parents outside the list make a bone a root. On a cycle
/// the names of the bones that could not be ordered are returned.
pub fn bone_order(bones: &[BoneSpec]) -> Result<Vec<usize>, Vec<String>> {
    let index: HashMap<&str, usize> = bones
        .iter()
        .enumerate()
        .map(|(i, b)| (b.name.as_str(), i))
        .collect();

    let mut indeg = vec![0usize; bones.len()];
    let mut children: Vec<Vec<usize>> = vec![Vec::new(); bones.len()];
    for (i, bone) in bones.iter().enumerate() {
        match bone.parent.as_deref().map(|p| (p, index.get(p))) {
            Some((_, Some(&p))) => {
                children[p].push(i);
                indeg[i] += 1;
            }
            Some((p, None)) => log::debug!("bone {}: parent '{p}' not in figure", bone.name),
            None => {}
        }
    }

    let mut q: VecDeque<usize> = (0..bones.len()).filter(|&i| indeg[i] == 0).collect();
    let mut order = Vec::with_capacity(bones.len());
    while let Some(u) = q.pop_front() {
        order.push(u);
        for &v in &children[u] {
            indeg[v] -= 1;
            if indeg[v] == 0 {
                q.push_back(v);
            }
        }
    }

    if order.len() != bones.len() {
        return Err((0..bones.len())
            .filter(|&i| indeg[i] > 0)
            .map(|i| bones[i].name.clone())
            .collect());
    }
    Ok(order)
}
