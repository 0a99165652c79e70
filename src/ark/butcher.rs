//! Butcher tables for additive Runge-Kutta methods.
//!
//! A method is one explicit table, one diagonally implicit table, or an
//! explicit/implicit pair with matching stage counts and abscissae. Tables
//! are either looked up by number (see [`table_id`]) or supplied in full.

use crate::ark::ArkError;
use crate::ark::config::IntegrationMode;

/// Numbers of the built-in tables.
pub mod table_id {
    /// Heun-Euler ERK, 2 stages, order 2, embedding 1.
    pub const HEUN_EULER_2_1_2: i32 = 0;
    /// Bogacki-Shampine ERK, 4 stages, order 3, embedding 2.
    pub const BOGACKI_SHAMPINE_4_2_3: i32 = 1;
    /// Explicit half of the Kennedy-Carpenter ARK3(2)4L[2]SA pair.
    pub const ARK324L2SA_ERK_4_2_3: i32 = 2;
    /// SDIRK, 2 stages, order 2, embedding 1.
    pub const SDIRK_2_1_2: i32 = 12;
    /// Kvaerno ESDIRK, 4 stages, order 3, embedding 2.
    pub const KVAERNO_4_2_3: i32 = 15;
    /// Implicit half of the Kennedy-Carpenter ARK3(2)4L[2]SA pair.
    pub const ARK324L2SA_DIRK_4_2_3: i32 = 16;
}

/// One Runge-Kutta table with an optional embedded method.
#[derive(Clone, Debug, PartialEq)]
pub struct ButcherTable {
    /// Name used in log messages
    pub name: String,
    /// Stage abscissae
    pub c: Vec<f64>,
    /// Stage coefficients, `a[i][j]`
    pub a: Vec<Vec<f64>>,
    /// Solution weights
    pub b: Vec<f64>,
    /// Embedded weights for the error estimate
    pub embedding: Option<Vec<f64>>,
    /// Order of the method
    pub order: usize,
    /// Order of the embedded method (0 without embedding)
    pub embedded_order: usize,
}

impl ButcherTable {
    /// Create a table without embedding.
    ///
    /// # Errors
    /// Returns [`ArkError::IllegalInput`] unless `a` is square and `b`, `c`
    /// have one entry per stage.
    pub fn new(
        name: impl Into<String>,
        order: usize,
        c: Vec<f64>,
        a: Vec<Vec<f64>>,
        b: Vec<f64>,
    ) -> Result<Self, ArkError> {
        let table = Self {
            name: name.into(),
            c,
            a,
            b,
            embedding: None,
            order,
            embedded_order: 0,
        };
        table.check_shape()?;
        Ok(table)
    }

    /// Check that `a` is square, `b`, `c` and the embedding have one entry per
    /// stage and every coefficient is finite.
    pub fn check_shape(&self) -> Result<(), ArkError> {
        let name = &self.name;
        let s = self.b.len();
        if s == 0 {
            return Err(ArkError::IllegalInput(format!("table {name} has no stages")));
        }
        let embedding_len = self.embedding.as_ref().map_or(s, Vec::len);
        if self.c.len() != s
            || self.a.len() != s
            || self.a.iter().any(|row| row.len() != s)
            || embedding_len != s
        {
            return Err(ArkError::IllegalInput(format!(
                "table {name}: coefficient shapes do not match {s} stages"
            )));
        }
        let non_finite = self
            .a
            .iter()
            .flatten()
            .chain(&self.b)
            .chain(&self.c)
            .chain(self.embedding.iter().flatten())
            .any(|v| !v.is_finite());
        if non_finite {
            return Err(ArkError::IllegalInput(format!(
                "table {name} has non-finite coefficients"
            )));
        }
        Ok(())
    }

    /// Attach embedded weights of order `p`.
    pub fn with_embedding(mut self, d: Vec<f64>, p: usize) -> Result<Self, ArkError> {
        if d.len() != self.stages() {
            return Err(ArkError::IllegalInput(format!(
                "table {}: embedding has {} weights for {} stages",
                self.name,
                d.len(),
                self.stages()
            )));
        }
        self.embedding = Some(d);
        self.embedded_order = p;
        Ok(self)
    }

    /// Number of stages.
    pub fn stages(&self) -> usize {
        self.b.len()
    }

    /// Whether `a` is strictly lower triangular.
    pub fn is_explicit(&self) -> bool {
        self.a
            .iter()
            .enumerate()
            .all(|(i, row)| row.iter().skip(i).all(|&v| v == 0.0))
    }

    /// Whether `a` is lower triangular.
    pub fn is_diagonally_implicit(&self) -> bool {
        self.a
            .iter()
            .enumerate()
            .all(|(i, row)| row.iter().skip(i + 1).all(|&v| v == 0.0))
    }

    /// Look up a built-in table by number.
    pub fn named(id: i32) -> Option<Self> {
        let table = match id {
            table_id::HEUN_EULER_2_1_2 => heun_euler(),
            table_id::BOGACKI_SHAMPINE_4_2_3 => bogacki_shampine(),
            table_id::ARK324L2SA_ERK_4_2_3 => ark324_erk(),
            table_id::SDIRK_2_1_2 => sdirk_2_1_2(),
            table_id::KVAERNO_4_2_3 => kvaerno_4_2_3(),
            table_id::ARK324L2SA_DIRK_4_2_3 => ark324_dirk(),
            _ => return None,
        };
        Some(table)
    }
}

/// The tables of one method, as used by the stepper.
#[derive(Clone, Debug, PartialEq)]
pub struct MethodTables {
    /// Table applied to the explicit right-hand side
    pub explicit: Option<ButcherTable>,
    /// Table applied to the implicit right-hand side
    pub implicit: Option<ButcherTable>,
}

impl MethodTables {
    /// An explicit-only method.
    pub fn explicit(table: ButcherTable) -> Self {
        Self {
            explicit: Some(table),
            implicit: None,
        }
    }

    /// An implicit-only method.
    pub fn implicit(table: ButcherTable) -> Self {
        Self {
            explicit: None,
            implicit: Some(table),
        }
    }

    /// An additive explicit/implicit pair.
    pub fn pair(explicit: ButcherTable, implicit: ButcherTable) -> Self {
        Self {
            explicit: Some(explicit),
            implicit: Some(implicit),
        }
    }

    /// Resolve a table number for an integration mode.
    ///
    /// # Errors
    /// Returns [`ArkError::IllegalInput`] for unknown numbers and for numbers
    /// that do not fit the mode.
    pub fn from_id(id: i32, mode: IntegrationMode) -> Result<Self, ArkError> {
        let table = ButcherTable::named(id)
            .ok_or_else(|| ArkError::IllegalInput(format!("unknown Butcher table {id}")))?;
        let tables = match mode {
            IntegrationMode::Explicit => Self::explicit(table),
            IntegrationMode::Implicit => Self::implicit(table),
            IntegrationMode::Imex => match id {
                table_id::ARK324L2SA_ERK_4_2_3 | table_id::ARK324L2SA_DIRK_4_2_3 => {
                    Self::pair(ark324_erk(), ark324_dirk())
                }
                _ => {
                    return Err(ArkError::IllegalInput(format!(
                        "Butcher table {id} is not an IMEX pair"
                    )));
                }
            },
        };
        tables.validate(mode)?;
        Ok(tables)
    }

    /// Default method for a mode.
    pub fn default_for(mode: IntegrationMode) -> Self {
        match mode {
            IntegrationMode::Imex => Self::pair(ark324_erk(), ark324_dirk()),
            IntegrationMode::Explicit => Self::explicit(bogacki_shampine()),
            IntegrationMode::Implicit => Self::implicit(ark324_dirk()),
        }
    }

    /// Number of stages.
    pub fn stages(&self) -> usize {
        self.explicit
            .as_ref()
            .or(self.implicit.as_ref())
            .map_or(0, ButcherTable::stages)
    }

    /// Order of the method (the lower of the two halves).
    pub fn order(&self) -> usize {
        self.tables().map(|t| t.order).min().unwrap_or(0)
    }

    /// Order of the embedded method (the lower of the two halves).
    pub fn embedded_order(&self) -> usize {
        self.tables().map(|t| t.embedded_order).min().unwrap_or(0)
    }

    /// Whether both halves carry embedded weights.
    pub fn has_embedding(&self) -> bool {
        self.tables().all(|t| t.embedding.is_some())
    }

    /// Stage abscissae (implicit table when present).
    pub fn c(&self) -> &[f64] {
        self.implicit
            .as_ref()
            .or(self.explicit.as_ref())
            .map(|t| t.c.as_slice())
            .unwrap_or(&[])
    }

    fn tables(&self) -> impl Iterator<Item = &ButcherTable> {
        self.explicit.iter().chain(self.implicit.iter())
    }

    /// Check the tables against a mode.
    pub fn validate(&self, mode: IntegrationMode) -> Result<(), ArkError> {
        let need_explicit = matches!(mode, IntegrationMode::Imex | IntegrationMode::Explicit);
        let need_implicit = matches!(mode, IntegrationMode::Imex | IntegrationMode::Implicit);
        for table in self.tables() {
            table.check_shape()?;
        }

        match (&self.explicit, need_explicit) {
            (None, true) => {
                return Err(ArkError::IllegalInput(format!(
                    "{mode} integration needs an explicit table"
                )));
            }
            (Some(_), false) => {
                return Err(ArkError::IllegalInput(format!(
                    "{mode} integration takes no explicit table"
                )));
            }
            (Some(t), true) if !t.is_explicit() => {
                return Err(ArkError::IllegalInput(format!(
                    "table {} is not strictly lower triangular",
                    t.name
                )));
            }
            _ => {}
        }

        match (&self.implicit, need_implicit) {
            (None, true) => {
                return Err(ArkError::IllegalInput(format!(
                    "{mode} integration needs an implicit table"
                )));
            }
            (Some(_), false) => {
                return Err(ArkError::IllegalInput(format!(
                    "{mode} integration takes no implicit table"
                )));
            }
            (Some(t), true) if !t.is_diagonally_implicit() => {
                return Err(ArkError::IllegalInput(format!(
                    "table {} is not diagonally implicit",
                    t.name
                )));
            }
            _ => {}
        }

        if let (Some(e), Some(i)) = (&self.explicit, &self.implicit) {
            if e.stages() != i.stages() {
                return Err(ArkError::IllegalInput(format!(
                    "tables {} and {} have different stage counts",
                    e.name, i.name
                )));
            }
            let c_mismatch = e.c.iter().zip(i.c.iter()).any(|(a, b)| (a - b).abs() > 1e-8);
            if c_mismatch {
                return Err(ArkError::IllegalInput(format!(
                    "tables {} and {} have different abscissae",
                    e.name, i.name
                )));
            }
        }
        Ok(())
    }
}

// =============================================================================
// Built-in tables
// =============================================================================

fn build(
    name: &str,
    order: usize,
    c: Vec<f64>,
    a: Vec<Vec<f64>>,
    b: Vec<f64>,
    d: Vec<f64>,
    p: usize,
) -> ButcherTable {
    let s = b.len();
    ButcherTable {
        name: name.to_string(),
        c,
        a,
        b,
        embedding: Some(d),
        order,
        embedded_order: p,
    }
    .pad(s)
}

impl ButcherTable {
    /// Pad short rows with zeros (built-in tables list only the lower part).
    fn pad(mut self, s: usize) -> Self {
        for row in &mut self.a {
            row.resize(s, 0.0);
        }
        self
    }
}

fn heun_euler() -> ButcherTable {
    build(
        "heun-euler-2-1-2",
        2,
        vec![0.0, 1.0],
        vec![vec![], vec![1.0]],
        vec![0.5, 0.5],
        vec![1.0, 0.0],
        1,
    )
}

fn bogacki_shampine() -> ButcherTable {
    build(
        "bogacki-shampine-4-2-3",
        3,
        vec![0.0, 0.5, 0.75, 1.0],
        vec![
            vec![],
            vec![0.5],
            vec![0.0, 0.75],
            vec![2.0 / 9.0, 1.0 / 3.0, 4.0 / 9.0],
        ],
        vec![2.0 / 9.0, 1.0 / 3.0, 4.0 / 9.0, 0.0],
        vec![7.0 / 24.0, 0.25, 1.0 / 3.0, 0.125],
        2,
    )
}

const ARK324_GAMMA: f64 = 1_767_732_205_903.0 / 4_055_673_282_236.0;

/// Weights shared by both halves of ARK3(2)4L[2]SA.
fn ark324_weights() -> (Vec<f64>, Vec<f64>) {
    let b = vec![
        1_471_266_399_579.0 / 7_840_856_788_654.0,
        -4_482_444_167_858.0 / 7_529_755_066_697.0,
        11_266_239_266_428.0 / 11_593_286_722_821.0,
        ARK324_GAMMA,
    ];
    let d = vec![
        2_756_255_671_327.0 / 12_835_298_489_170.0,
        -10_771_552_573_575.0 / 22_201_958_757_719.0,
        9_247_589_265_047.0 / 10_645_013_368_117.0,
        2_193_209_047_091.0 / 5_459_859_503_100.0,
    ];
    (b, d)
}

fn ark324_c() -> Vec<f64> {
    vec![0.0, 2.0 * ARK324_GAMMA, 0.6, 1.0]
}

fn ark324_erk() -> ButcherTable {
    let (b, d) = ark324_weights();
    build(
        "ark324l2sa-erk-4-2-3",
        3,
        ark324_c(),
        vec![
            vec![],
            vec![1_767_732_205_903.0 / 2_027_836_641_118.0],
            vec![
                5_535_828_885_825.0 / 10_492_691_773_637.0,
                788_022_342_437.0 / 10_882_634_858_940.0,
            ],
            vec![
                6_485_989_280_629.0 / 16_251_701_735_622.0,
                -4_246_266_847_089.0 / 9_704_473_918_619.0,
                10_755_448_449_292.0 / 10_357_097_424_841.0,
            ],
        ],
        b,
        d,
        2,
    )
}

fn ark324_dirk() -> ButcherTable {
    let (b, d) = ark324_weights();
    let g = ARK324_GAMMA;
    build(
        "ark324l2sa-dirk-4-2-3",
        3,
        ark324_c(),
        vec![
            vec![0.0],
            vec![g, g],
            vec![
                2_746_238_789_719.0 / 10_658_868_560_708.0,
                -640_167_445_237.0 / 6_845_629_431_997.0,
                g,
            ],
            b.clone(),
        ],
        b,
        d,
        2,
    )
}

fn sdirk_2_1_2() -> ButcherTable {
    build(
        "sdirk-2-1-2",
        2,
        vec![1.0, 0.0],
        vec![vec![1.0], vec![-1.0, 1.0]],
        vec![0.5, 0.5],
        vec![1.0, 0.0],
        1,
    )
}

fn kvaerno_4_2_3() -> ButcherTable {
    let g = 0.435_866_521_5;
    build(
        "kvaerno-4-2-3",
        3,
        vec![0.0, 2.0 * g, 1.0, 1.0],
        vec![
            vec![0.0],
            vec![g, g],
            vec![0.490_563_388_419_108, 0.073_570_090_080_892, g],
            vec![
                0.308_809_969_973_036,
                1.490_563_388_254_106,
                -1.235_239_879_727_145,
                g,
            ],
        ],
        vec![
            0.308_809_969_973_036,
            1.490_563_388_254_106,
            -1.235_239_879_727_145,
            g,
        ],
        vec![0.490_563_388_419_108, 0.073_570_090_080_892, g, 0.0],
        2,
    )
}
