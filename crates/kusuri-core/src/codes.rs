//! Static code → label tables, one per semantic axis.
//!
//! Every coded field in the upstream feeds resolves through exactly one of
//! these tables. Lookups never fail: an unmapped code resolves to the
//! table's "unknown" label (e.g. `不明な発生要因`) so the code is never
//! silently dropped.

/// A fixed mapping from short codes to display labels for one axis.
#[derive(Debug)]
pub struct CodeTable {
    axis: CodeAxis,
    unknown: &'static str,
    /// Append ` (<code>)` to the unknown label.
    echo_code: bool,
    entries: &'static [(&'static str, &'static str)],
}

/// The semantic axes that carry coded values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodeAxis {
    ShipmentStatus,
    Month,
    Summary,
    Content,
    FactorText,
    Factor,
    FactorDoubt,
    Disease,
}

impl CodeAxis {
    pub const ALL: [CodeAxis; 8] = [
        CodeAxis::ShipmentStatus,
        CodeAxis::Month,
        CodeAxis::Summary,
        CodeAxis::Content,
        CodeAxis::FactorText,
        CodeAxis::Factor,
        CodeAxis::FactorDoubt,
        CodeAxis::Disease,
    ];

    pub fn table(self) -> &'static CodeTable {
        match self {
            CodeAxis::ShipmentStatus => &SHIPMENT_STATUS,
            CodeAxis::Month => &MONTH,
            CodeAxis::Summary => &SUMMARY,
            CodeAxis::Content => &CONTENT,
            CodeAxis::FactorText => &FACTOR_TEXT,
            CodeAxis::Factor => &FACTOR,
            CodeAxis::FactorDoubt => &FACTOR_DOUBT,
            CodeAxis::Disease => &DISEASE,
        }
    }
}

impl CodeTable {
    pub fn axis(&self) -> CodeAxis {
        self.axis
    }

    /// Label for `code`, if the table knows it.
    pub fn lookup(&self, code: &str) -> Option<&'static str> {
        let code = code.trim();
        self.entries
            .iter()
            .find(|(c, _)| *c == code)
            .map(|(_, label)| *label)
    }

    /// Label for `code`, falling back to the axis' unknown label.
    pub fn resolve(&self, code: &str) -> String {
        match self.lookup(code) {
            Some(label) => label.to_string(),
            None => self.unknown_label(code),
        }
    }

    pub fn unknown_label(&self, code: &str) -> String {
        if self.echo_code {
            format!("{} ({})", self.unknown, code.trim())
        } else {
            self.unknown.to_string()
        }
    }

    /// Reverse lookup: the code whose label equals `label`.
    pub fn code_for(&self, label: &str) -> Option<&'static str> {
        self.entries
            .iter()
            .find(|(_, l)| *l == label)
            .map(|(c, _)| *c)
    }

    pub fn entries(&self) -> &'static [(&'static str, &'static str)] {
        self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Treat an absent, empty, or literal `"null"` CODE attribute as no code.
pub fn present_code(code: Option<&str>) -> Option<&str> {
    code.map(str::trim)
        .filter(|c| !c.is_empty() && *c != "null")
}

// ── Drug shortage feed ──

pub static SHIPMENT_STATUS: CodeTable = CodeTable {
    axis: CodeAxis::ShipmentStatus,
    unknown: "不明な出荷対応",
    echo_code: false,
    entries: &[
        ("01", "通常出荷"),
        ("02", "限定出荷（自社の事情）"),
        ("03", "限定出荷（他社品の影響）"),
        ("04", "限定出荷（その他）"),
        ("05", "供給停止"),
    ],
};

// ── Incident reports ──

pub static MONTH: CodeTable = CodeTable {
    axis: CodeAxis::Month,
    unknown: "不明な月",
    echo_code: true,
    entries: &[
        ("01", "1月"),
        ("02", "2月"),
        ("03", "3月"),
        ("04", "4月"),
        ("05", "5月"),
        ("06", "6月"),
        ("07", "7月"),
        ("08", "8月"),
        ("09", "9月"),
        ("10", "10月"),
        ("11", "11月"),
        ("12", "12月"),
    ],
};

pub static SUMMARY: CodeTable = CodeTable {
    axis: CodeAxis::Summary,
    unknown: "不明な事例区分",
    echo_code: false,
    entries: &[
        ("01", "調剤に関するヒヤリ・ハット事例"),
        ("02", "疑義照会や処方医への情報提供に関する事例"),
        ("03", "特定保険医療材料等に関する事例"),
        ("04", "一般用医薬品等の販売に関する事例"),
    ],
};

pub static CONTENT: CodeTable = CodeTable {
    axis: CodeAxis::Content,
    unknown: "不明な事例内容",
    echo_code: false,
    entries: &[
        ("01", "レセコンの入力間違い"),
        ("02", "薬剤取り違え（異なる成分）"),
        ("03", "薬剤取り違え（同成分）"),
        ("04", "数量間違い"),
        ("05", "剤形間違い"),
        ("06", "規格間違い"),
        ("07", "用法間違い"),
        ("08", "患者間違い"),
        ("09", "その他"),
    ],
};

pub static FACTOR_TEXT: CodeTable = CodeTable {
    axis: CodeAxis::FactorText,
    unknown: "不明な発生要因",
    echo_code: false,
    entries: &[
        ("01", "処方箋やその記載のされ方の要因"),
        ("02", "調剤方法の要因"),
        ("03", "鑑査方法の要因"),
        ("04", "患者の要因"),
        ("05", "医薬品の要因"),
        ("06", "情報システムの要因"),
        ("07", "その他の要因"),
    ],
};

pub static FACTOR: CodeTable = CodeTable {
    axis: CodeAxis::Factor,
    unknown: "不明な発生要因",
    echo_code: false,
    entries: &[
        ("100101", "判断誤り"),
        ("100102", "手順不遵守"),
        ("100103", "スタッフ間のコミュニケーション不足・齟齬"),
        ("100104", "患者とのコミュニケーション不足・齟齬"),
        ("100199", "その他"),
        ("110101", "知識不足"),
        ("110102", "技術・手技が未熟"),
        ("110103", "慣れ・慢心"),
        ("110104", "焦り・慌て"),
        ("110105", "疲労・体調不良・身体的不調"),
        ("110106", "心配ごと等心理的状態"),
        ("110199", "その他"),
        ("120101", "医薬品の名称類似"),
        ("120102", "医薬品や包装の外観類似"),
        ("120103", "医薬品包装表示・添付文書の要因"),
        ("120104", "処方箋やその記載のされ方の要因"),
        ("120105", "コンピューターシステムの使いにくさ・不具合"),
        ("120106", "調剤設備・調剤機器の使いにくさ・不具合"),
        ("120107", "薬剤服用歴などの記録の不備"),
        ("120108", "調剤室の環境的な要因"),
        ("120109", "調剤室以外の環境的な要因"),
        ("120199", "その他"),
        ("130101", "繁忙であった"),
        ("130102", "標榜する営業時間外であった"),
        ("130103", "普段とは異なる業務状況だった"),
        ("130199", "その他"),
        ("140101", "教育訓練のなされ方"),
        ("140102", "設備機器等の管理"),
        ("140103", "薬局内のルールや管理の体制・仕方"),
        ("140104", "薬局内の風土・雰囲気"),
        ("140199", "その他"),
        ("150101", "患者や家族の不注意"),
        ("150102", "患者や家族の理解力・誤解"),
        ("150103", "患者や家族のコンプライアンス・協力態度"),
        ("150199", "その他"),
    ],
};

pub static FACTOR_DOUBT: CodeTable = CodeTable {
    axis: CodeAxis::FactorDoubt,
    unknown: "不明な発生要因(疑義照会)",
    echo_code: false,
    entries: &[
        ("160101", "患者とのコミュニケーション不足・齟齬"),
        ("160102", "カルテ記載の不備"),
        ("160103", "コンピューターシステムの使いにくさ・不具合"),
        ("160104", "連携不足"),
        ("160105", "知識不足"),
        ("160106", "判断誤り"),
        ("160107", "処方内容の確認不足"),
        ("160199", "その他"),
        ("170101", "医薬品の名称類似"),
        ("170102", "患者や家族の要因"),
        ("170199", "その他"),
    ],
};

// ── Infection surveillance ──

/// Disease key → section heading used in the surveillance workbook.
pub static DISEASE: CodeTable = CodeTable {
    axis: CodeAxis::Disease,
    unknown: "不明な疾患",
    echo_code: false,
    entries: &[
        ("Influenza", "インフルエンザ"),
        ("COVID-19", "COVID-19"),
        ("ARI", "急性呼吸器感染症"),
        ("RSV", "ＲＳウイルス感染症"),
        ("PharyngoconjunctivalFever", "咽頭結膜熱"),
        ("AGS_Pharyngitis", "Ａ群溶血性レンサ球菌咽頭炎"),
        ("InfectiousGastroenteritis", "感染性胃腸炎"),
        ("Chickenpox", "水痘"),
        ("HandFootMouthDisease", "手足口病"),
        ("ErythemaInfectiosum", "伝染性紅斑"),
        ("ExanthemSubitum", "突発性発しん"),
        ("Herpangina", "ヘルパンギーナ"),
        ("Mumps", "流行性耳下腺炎"),
        ("AcuteHemorrhagicConjunctivitis", "急性出血性結膜炎"),
        ("EpidemicKeratoconjunctivitis", "流行性角結膜炎"),
        ("BacterialMeningitis", "細菌性髄膜炎"),
        ("AsepticMeningitis", "無菌性髄膜炎"),
        ("MycoplasmaPneumonia", "マイコプラズマ肺炎"),
        ("ChlamydiaPneumonia", "クラミジア肺炎"),
        ("RotavirusGastroenteritis", "感染性胃腸炎（ロタウイルス）"),
    ],
};
